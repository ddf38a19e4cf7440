//! Terminal output for assessments and the risk trend.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::gauge::{ColorBand, GaugeView};
use crate::models::{AssessmentRequest, AssessmentResult, HistoryPoint, WeatherObservation};

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// Band colors
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const ORANGE: &str = "\x1b[38;5;208m";
const RED: &str = "\x1b[91m";

const ICON_FIRE: &str = "🔥";
const ICON_PIN: &str = "📍";
const ICON_ALERT: &str = "⚠️";

/// Width of the trend bars in human output.
const BAR_WIDTH: usize = 40;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON document
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// One finished assessment, as printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub location: Option<WeatherObservation>,
    pub request: AssessmentRequest,
    pub result: AssessmentResult,
    pub gauge: GaugeView,
}

fn band_color(band: ColorBand) -> &'static str {
    match band {
        ColorBand::Low => GREEN,
        ColorBand::Medium => YELLOW,
        ColorBand::High => ORANGE,
        ColorBand::Critical => RED,
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> io::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Write an assessment in human-readable format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, report: &AssessmentReport) -> io::Result<()> {
    let reading = report.gauge.reading;
    let color = band_color(reading.band);

    if let Some(place) = &report.location {
        let observed = place
            .observed_at
            .map(|t| format!(" {DIM}@ {}{RESET}", t.format("%Y-%m-%d %H:%M")))
            .unwrap_or_default();
        writeln!(
            writer,
            "{ICON_PIN} {BOLD}{}{RESET} {DIM}({:.2}°, {:.2}°){RESET}{observed}",
            place.place_name, place.lat, place.lng
        )?;
    }

    let request = &report.request;
    writeln!(
        writer,
        "{DIM}{:.1}°C │ {:.0}% RH │ {:.1} km/h │ {:.1} mm │ veg {:.2}{RESET}",
        request.temperature,
        request.humidity,
        request.wind_speed,
        request.rainfall,
        request.vegetation_index
    )?;

    let alert = if report.gauge.alert {
        format!(" {ICON_ALERT}")
    } else {
        String::new()
    };
    writeln!(
        writer,
        "{ICON_FIRE} {color}{BOLD}{:>3}%{RESET} │ {color}{}{RESET} │ {} Risk{alert}",
        reading.display_percentage,
        reading.band.color_name(),
        report.gauge.risk_label
    )?;

    if let Some(advisory) = report.gauge.advisory {
        writeln!(writer, "   {advisory}")?;
    }

    for item in &report.result.analysis {
        writeln!(
            writer,
            "   {DIM}{:<14} {:>6.2}  {}{RESET}",
            item.feature, item.contribution, item.impact
        )?;
    }
    Ok(())
}

/// Write an assessment in the specified format.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_assessment<W: Write>(
    writer: &mut W,
    report: &AssessmentReport,
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, report),
        Format::Json => writeln!(writer, "{}", to_json(report, true)?),
        Format::Ndjson => writeln!(writer, "{}", to_json(report, false)?),
    }
}

/// Write the risk trend in the specified format.
///
/// Human output draws one bar per point, colored by band.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_history<W: Write>(writer: &mut W, points: &[HistoryPoint], format: Format) -> io::Result<()> {
    match format {
        Format::Human => {
            for point in points {
                let risk = point.risk.clamp(0.0, 1.0);
                let filled = (risk * BAR_WIDTH as f64).round() as usize;
                let color = band_color(ColorBand::from_probability(risk));
                writeln!(
                    writer,
                    "{DIM}{:>10}{RESET} {color}{}{RESET}{DIM}{}{RESET} {:>3.0}%",
                    point.day,
                    "█".repeat(filled),
                    "·".repeat(BAR_WIDTH - filled),
                    risk * 100.0
                )?;
            }
            Ok(())
        }
        Format::Json => writeln!(writer, "{}", to_json(&points, true)?),
        Format::Ndjson => {
            for point in points {
                writeln!(writer, "{}", to_json(point, false)?)?;
            }
            Ok(())
        }
    }
}
