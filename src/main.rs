//! PyroGuard - Fire-risk assessment dashboard.
//!
//! Resolves a city to live weather, asks the prediction backend for a
//! fire-risk assessment and shows it on a gauge, a map and a trend chart,
//! either in the browser or in the terminal.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod dashboard;
mod errors;
mod gauge;
mod map;
mod models;
mod orchestrator;
mod output;
mod resolver;
mod server;
mod sync;

use cli::{Cli, Command};
use client::{BackendClient, Endpoints, PredictionService, http_client};
use dashboard::DashboardView;
use models::AssessmentRequest;
use orchestrator::spawn_session;
use output::AssessmentReport;
use resolver::LocationResolver;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    let endpoints = Endpoints::from(cli.endpoints);
    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    match cli.command {
        Command::Assess(args) => runtime.block_on(cmd_assess(args, endpoints)),
        Command::History(args) => runtime.block_on(cmd_history(args, endpoints)),
        Command::Ui(args) => cmd_ui(&runtime, args, endpoints),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the `assess` command - one pass through the pipeline in a
/// private session.
async fn cmd_assess(args: cli::AssessArgs, endpoints: Endpoints) -> Result<()> {
    let client = http_client().context("failed to create HTTP client")?;
    let backend = Arc::new(BackendClient::new(client.clone(), endpoints.backend));
    let resolver = Arc::new(LocationResolver::new(
        client,
        endpoints.geocoder,
        endpoints.weather,
    ));
    let session = spawn_session(backend, resolver);

    let command = match args.city {
        Some(city) => orchestrator::Command::Search(city),
        None => orchestrator::Command::Submit(AssessmentRequest {
            temperature: args.temperature,
            humidity: args.humidity,
            wind_speed: args.wind_speed,
            rainfall: args.rainfall,
            vegetation_index: args.vegetation,
        }),
    };
    session.send(command).await?;

    // Wait until the pipeline either shows a result or raises a notice
    let mut views = session.subscribe();
    let view: DashboardView = views
        .wait_for(|v| (v.result.is_some() && !v.loading) || v.notice.is_some())
        .await
        .context("session ended unexpectedly")?
        .clone();

    if let Some(notice) = view.notice {
        anyhow::bail!("{}", notice.message);
    }
    let (Some(result), Some(gauge)) = (view.result, view.gauge) else {
        anyhow::bail!("no assessment produced");
    };

    let report = AssessmentReport {
        location: view.observation,
        request: view.fields,
        result,
        gauge,
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_assessment(&mut handle, &report, args.format)?;

    Ok(())
}

/// Execute the `history` command - print the risk trend.
async fn cmd_history(args: cli::HistoryArgs, endpoints: Endpoints) -> Result<()> {
    let client = http_client().context("failed to create HTTP client")?;
    let backend = BackendClient::new(client, endpoints.backend);

    let points = backend
        .history()
        .await
        .context("failed to fetch risk history")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_history(&mut handle, &points, args.format)?;

    Ok(())
}

/// Execute the `ui` command - start web server.
fn cmd_ui(runtime: &tokio::runtime::Runtime, args: cli::UiArgs, endpoints: Endpoints) -> Result<()> {
    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        endpoints,
    };

    // Print startup message
    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🔥 PyroGuard Dashboard\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:    \x1b[96m{}\x1b[0m", url);
    println!("  Backend:  {}", config.endpoints.backend);
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    runtime.block_on(server::run_server(config))
}
