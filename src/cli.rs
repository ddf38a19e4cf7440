//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use clap::{Args, Parser, Subcommand};

use crate::client::{DEFAULT_BACKEND_URL, DEFAULT_GEOCODER_URL, DEFAULT_WEATHER_URL, Endpoints};
use crate::output::Format;

/// Fire-risk assessment dashboard.
#[derive(Parser, Debug)]
#[command(name = "pyroguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

/// Base URLs of the external services.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Prediction backend base URL
    #[arg(long, global = true, default_value = DEFAULT_BACKEND_URL)]
    pub backend_url: String,

    /// Geocoding service base URL (Nominatim API)
    #[arg(long, global = true, default_value = DEFAULT_GEOCODER_URL)]
    pub geocoder_url: String,

    /// Weather service base URL (Open-Meteo API)
    #[arg(long, global = true, default_value = DEFAULT_WEATHER_URL)]
    pub weather_url: String,
}

impl From<EndpointArgs> for Endpoints {
    fn from(args: EndpointArgs) -> Self {
        Self {
            backend: args.backend_url,
            geocoder: args.geocoder_url,
            weather: args.weather_url,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assess fire risk once (by city or explicit conditions) and exit
    Assess(AssessArgs),

    /// Show the historical risk trend
    History(HistoryArgs),

    /// Start the web dashboard
    Ui(UiArgs),
}

/// Arguments for the `assess` command.
#[derive(Parser, Debug)]
pub struct AssessArgs {
    /// Look up current weather for this city instead of using the fields below
    #[arg(long, conflicts_with_all = ["temperature", "humidity", "wind_speed", "rainfall", "vegetation"])]
    pub city: Option<String>,

    /// Temperature (°C)
    #[arg(long, default_value = "30", allow_negative_numbers = true)]
    pub temperature: f64,

    /// Relative humidity (%)
    #[arg(long, default_value = "40")]
    pub humidity: f64,

    /// Wind speed (km/h)
    #[arg(long, default_value = "15")]
    pub wind_speed: f64,

    /// Rainfall (mm)
    #[arg(long, default_value = "0")]
    pub rainfall: f64,

    /// Vegetation index (0-1)
    #[arg(long, default_value = "0.5")]
    pub vegetation: f64,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `history` command.
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `ui` command.
#[derive(Parser, Debug)]
pub struct UiArgs {
    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess_city_conflicts_with_fields() {
        let parsed = Cli::try_parse_from(["pyroguard", "assess", "--city", "Paris", "--humidity", "20"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_global_endpoint_flags() {
        let cli = Cli::try_parse_from([
            "pyroguard",
            "history",
            "--backend-url",
            "http://backend:9000",
        ])
        .expect("valid args");

        let endpoints = Endpoints::from(cli.endpoints);
        assert_eq!(endpoints.backend, "http://backend:9000");
        assert_eq!(endpoints.weather, DEFAULT_WEATHER_URL);
    }
}
