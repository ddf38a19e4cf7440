//! Error types for pyroguard.
//!
//! Uses `thiserror` for library-style error definitions.

use thiserror::Error;

/// Errors that can occur in pyroguard operations.
#[derive(Error, Debug)]
pub enum PyroguardError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Remote service returned an error status
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Geocoder found no match for the query
    #[error("No location found for '{query}'")]
    ResolutionNotFound { query: String },

    /// Geocoding or weather lookup failed at the network/parse level
    #[error("Location lookup failed: {0}")]
    ResolutionTransport(String),

    /// Prediction request failed
    #[error("Risk assessment failed: {0}")]
    AssessmentTransport(String),

    /// Request rejected before it was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The session actor is gone
    #[error("Session closed")]
    SessionClosed,
}

impl PyroguardError {
    /// Message shown to the operator on the dashboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ResolutionNotFound { .. } => "City not found.".to_string(),
            Self::ResolutionTransport(_) => {
                "Failed to fetch city data. Check your connection.".to_string()
            }
            Self::AssessmentTransport(_) | Self::Http(_) | Self::Parse(_) | Self::Api { .. } => {
                "Prediction failed. Ensure the backend is running.".to_string()
            }
            Self::InvalidRequest(reason) => format!("Invalid input: {reason}"),
            Self::SessionClosed => "Session expired. Reload the page.".to_string(),
        }
    }

    /// Collapse any lookup failure into the resolver's transport bucket,
    /// keeping `ResolutionNotFound` as is.
    #[must_use]
    pub fn into_resolution(self) -> Self {
        match self {
            Self::ResolutionNotFound { .. } | Self::ResolutionTransport(_) => self,
            other => Self::ResolutionTransport(other.to_string()),
        }
    }

    /// Collapse any prediction failure into `AssessmentTransport`.
    #[must_use]
    pub fn into_assessment(self) -> Self {
        match self {
            Self::AssessmentTransport(_) | Self::InvalidRequest(_) => self,
            other => Self::AssessmentTransport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_bucket_keeps_not_found() {
        let err = PyroguardError::ResolutionNotFound { query: "Atlantis".into() };
        assert!(matches!(
            err.into_resolution(),
            PyroguardError::ResolutionNotFound { .. }
        ));

        let err = PyroguardError::Api { status: 503, message: "down".into() };
        assert!(matches!(
            err.into_resolution(),
            PyroguardError::ResolutionTransport(_)
        ));
    }

    #[test]
    fn test_user_messages() {
        let err = PyroguardError::AssessmentTransport("connection refused".into());
        assert!(err.user_message().starts_with("Prediction failed"));

        let err = PyroguardError::ResolutionNotFound { query: "x".into() };
        assert_eq!(err.user_message(), "City not found.");
    }
}
