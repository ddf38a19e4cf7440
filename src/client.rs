//! Prediction backend client.
//!
//! Provides async HTTP access to the risk prediction service.
//! Uses reqwest with rustls for TLS.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::errors::PyroguardError;
use crate::models::{AssessmentRequest, AssessmentResult, HistoryPoint, Hotspot};

/// Connect timeout in seconds. No total request timeout is set.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent string for outbound requests.
pub const USER_AGENT: &str = concat!("pyroguard/", env!("CARGO_PKG_VERSION"));

/// Default prediction backend.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Default geocoding provider.
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

/// Default weather provider.
pub const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com";

/// Base URLs of every external collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub backend: String,
    pub geocoder: String,
    pub weather: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND_URL.to_string(),
            geocoder: DEFAULT_GEOCODER_URL.to_string(),
            weather: DEFAULT_WEATHER_URL.to_string(),
        }
    }
}

/// Build the shared reqwest client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be initialized.
pub fn http_client() -> Result<Client, PyroguardError> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Check the status and decode a JSON body.
pub(crate) async fn decode_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, PyroguardError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PyroguardError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// The external risk prediction service.
pub trait PredictionService: Send + Sync + 'static {
    /// `GET /history`
    fn history(&self) -> impl Future<Output = Result<Vec<HistoryPoint>, PyroguardError>> + Send;

    /// `GET /hotspots`
    fn hotspots(&self) -> impl Future<Output = Result<Vec<Hotspot>, PyroguardError>> + Send;

    /// `POST /predict`
    fn predict(
        &self,
        request: AssessmentRequest,
    ) -> impl Future<Output = Result<AssessmentResult, PyroguardError>> + Send;
}

/// Client for the prediction backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// Create a backend client for `base_url`.
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl PredictionService for BackendClient {
    #[instrument(skip(self))]
    async fn history(&self) -> Result<Vec<HistoryPoint>, PyroguardError> {
        let url = self.url("/history");
        debug!("fetching history from {}", url);

        let response = self.client.get(&url).send().await?;
        let points: Vec<HistoryPoint> = decode_json(response).await?;

        debug!("fetched {} history points", points.len());
        Ok(points)
    }

    #[instrument(skip(self))]
    async fn hotspots(&self) -> Result<Vec<Hotspot>, PyroguardError> {
        let url = self.url("/hotspots");
        debug!("fetching hotspots from {}", url);

        let response = self.client.get(&url).send().await?;
        let spots: Vec<Hotspot> = decode_json(response).await?;

        debug!("fetched {} hotspots", spots.len());
        Ok(spots)
    }

    #[instrument(skip(self))]
    async fn predict(&self, request: AssessmentRequest) -> Result<AssessmentResult, PyroguardError> {
        let url = self.url("/predict");
        debug!("posting prediction request to {}", url);

        let outcome: Result<AssessmentResult, PyroguardError> = async {
            let response = self.client.post(&url).json(&request).send().await?;
            decode_json(response).await
        }
        .await;

        outcome
            .and_then(AssessmentResult::normalized)
            .map_err(PyroguardError::into_assessment)
    }
}
