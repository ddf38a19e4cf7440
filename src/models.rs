//! Data models for the prediction backend and resolved locations.
//!
//! Field names on the wire follow the prediction service's JSON
//! (`wind_speed`, `risk_level`, `vegetation`).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::PyroguardError;

/// Vegetation index used when the form is filled from weather data.
pub const DEFAULT_VEGETATION_INDEX: f64 = 0.5;

/// Risk label as supplied by the backend.
///
/// Labels outside the four known levels are kept verbatim so the text can
/// still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    Other(String),
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
            Self::Other(label) => label,
        }
    }

    /// Canned advisory sentence for the level; unknown levels have none.
    #[must_use]
    pub fn advisory(&self) -> Option<&'static str> {
        match self {
            Self::Critical => Some("Immediate action required. Extreme fire danger."),
            Self::High => Some("Conditions are dangerous. High likelihood of fire."),
            Self::Medium => Some("Moderate risk. Exercise caution."),
            Self::Low => Some("Low risk. Conditions are stable."),
            Self::Other(_) => None,
        }
    }
}

impl From<String> for RiskLevel {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Low" => Self::Low,
            "Medium" => Self::Medium,
            "High" => Self::High,
            "Critical" => Self::Critical,
            _ => Self::Other(label),
        }
    }
}

impl From<RiskLevel> for String {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current conditions for a resolved place.
///
/// Identified by `place_name` for auto-trigger de-duplication.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherObservation {
    /// Air temperature (°C)
    pub temperature: f64,
    /// Relative humidity (%)
    pub humidity: f64,
    /// Wind speed at 10 m (km/h)
    pub wind_speed: f64,
    /// Precipitation (mm)
    pub rainfall: f64,
    pub lat: f64,
    pub lng: f64,
    /// First comma-delimited segment of the geocoder's display name
    pub place_name: String,
    /// Observation time reported by the weather provider (local time)
    pub observed_at: Option<NaiveDateTime>,
}

impl WeatherObservation {
    #[must_use]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }

    /// Assessment inputs derived from this observation.
    #[must_use]
    pub fn to_request(&self) -> AssessmentRequest {
        AssessmentRequest {
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            rainfall: self.rainfall,
            vegetation_index: DEFAULT_VEGETATION_INDEX,
        }
    }
}

/// Body of `POST /predict`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub rainfall: f64,
    #[serde(rename = "vegetation", alias = "vegetation_index")]
    pub vegetation_index: f64,
}

impl AssessmentRequest {
    /// Check the request before it leaves the process.
    ///
    /// Non-finite values are rejected. `vegetation_index` is clamped into
    /// [0, 1] and `humidity` into [0, 100].
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if any field is NaN or infinite.
    pub fn validated(self) -> Result<Self, PyroguardError> {
        let fields = [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("wind_speed", self.wind_speed),
            ("rainfall", self.rainfall),
            ("vegetation", self.vegetation_index),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(PyroguardError::InvalidRequest(format!(
                    "{name} must be a finite number"
                )));
            }
        }

        let mut request = self;
        let vegetation = request.vegetation_index.clamp(0.0, 1.0);
        if vegetation != request.vegetation_index {
            tracing::warn!(
                "vegetation index {} clamped to {}",
                request.vegetation_index,
                vegetation
            );
            request.vegetation_index = vegetation;
        }
        let humidity = request.humidity.clamp(0.0, 100.0);
        if humidity != request.humidity {
            tracing::warn!("humidity {} clamped to {}", request.humidity, humidity);
            request.humidity = humidity;
        }
        Ok(request)
    }
}

/// One feature's share of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub contribution: f64,
    pub impact: String,
}

/// Response of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub alert: bool,
    #[serde(default)]
    pub analysis: Vec<FeatureContribution>,
}

impl AssessmentResult {
    /// Clamp the backend probability into [0, 1].
    ///
    /// # Errors
    ///
    /// Returns `AssessmentTransport` if the probability is not a number.
    pub fn normalized(mut self) -> Result<Self, PyroguardError> {
        if self.probability.is_nan() {
            return Err(PyroguardError::AssessmentTransport(
                "backend returned NaN probability".into(),
            ));
        }
        self.probability = self.probability.clamp(0.0, 1.0);
        Ok(self)
    }
}

/// A known point of active fire risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "risk", alias = "risk_level")]
    pub risk_level: RiskLevel,
}

/// One point of the historical trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(alias = "date")]
    pub day: String,
    pub risk: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prediction_without_analysis() {
        let json = r#"{"probability":0.82,"risk_level":"Critical","alert":true}"#;
        let result: AssessmentResult = serde_json::from_str(json).expect("failed to parse");

        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.alert);
        assert!(result.analysis.is_empty());
    }

    #[test]
    fn test_unknown_risk_label_is_kept() {
        let json = r#"{"lat":37.7,"lng":-122.4,"risk":"Extreme"}"#;
        let spot: Hotspot = serde_json::from_str(json).expect("failed to parse");

        assert_eq!(spot.risk_level, RiskLevel::Other("Extreme".into()));
        assert_eq!(spot.risk_level.as_str(), "Extreme");
        assert!(spot.risk_level.advisory().is_none());
    }

    #[test]
    fn test_request_wire_names() {
        let request = AssessmentRequest {
            temperature: 22.0,
            humidity: 55.0,
            wind_speed: 10.0,
            rainfall: 0.0,
            vegetation_index: 0.5,
        };
        let value = serde_json::to_value(request).expect("failed to serialize");

        assert_eq!(value["wind_speed"], 10.0);
        assert_eq!(value["vegetation"], 0.5);
        assert!(value.get("vegetation_index").is_none());
    }

    #[test]
    fn test_history_accepts_date_alias() {
        let json = r#"[{"day":"Day 1","risk":0.3},{"date":"2024-07-02","risk":0.4}]"#;
        let points: Vec<HistoryPoint> = serde_json::from_str(json).expect("failed to parse");

        assert_eq!(points[1].day, "2024-07-02");
    }

    #[test]
    fn test_validated_clamps_vegetation_and_humidity() {
        let request = AssessmentRequest {
            temperature: 30.0,
            humidity: 140.0,
            wind_speed: 15.0,
            rainfall: 0.0,
            vegetation_index: 1.7,
        }
        .validated()
        .expect("finite request");

        assert_eq!(request.vegetation_index, 1.0);
        assert_eq!(request.humidity, 100.0);
    }

    #[test]
    fn test_validated_rejects_nan() {
        let request = AssessmentRequest {
            temperature: f64::NAN,
            humidity: 40.0,
            wind_speed: 15.0,
            rainfall: 0.0,
            vegetation_index: 0.5,
        };
        assert!(matches!(
            request.validated(),
            Err(PyroguardError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_normalized_clamps_probability() {
        let result = AssessmentResult {
            probability: 1.2,
            risk_level: RiskLevel::Critical,
            alert: true,
            analysis: Vec::new(),
        }
        .normalized()
        .expect("probability is a number");

        assert_eq!(result.probability, 1.0);
    }

    #[test]
    fn test_observation_to_request_uses_default_vegetation() {
        let observation = WeatherObservation {
            temperature: 22.0,
            humidity: 55.0,
            wind_speed: 10.0,
            rainfall: 0.0,
            lat: 48.85,
            lng: 2.35,
            place_name: "Paris".into(),
            observed_at: None,
        };
        let request = observation.to_request();

        assert_eq!(request.vegetation_index, DEFAULT_VEGETATION_INDEX);
        assert_eq!(request.temperature, 22.0);
    }
}
