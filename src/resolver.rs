//! Location resolver: place name → coordinates → current weather.
//!
//! Two chained lookups, strictly sequential. Geocoding goes through a
//! Nominatim-compatible search endpoint, weather through Open-Meteo.

use std::future::Future;

use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::client::decode_json;
use crate::errors::PyroguardError;
use crate::models::WeatherObservation;

/// Open-Meteo variables requested for the current instant.
const CURRENT_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,wind_speed_10m,precipitation";

/// Open-Meteo `current.time` format (local time, minute resolution).
const OBSERVATION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Anything that can turn a place name into a weather observation.
pub trait LocationLookup: Send + Sync + 'static {
    fn resolve(
        &self,
        query: String,
    ) -> impl Future<Output = Result<WeatherObservation, PyroguardError>> + Send;
}

/// Best geocoder match.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeMatch {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

/// Nominatim search result (coordinates are strings on the wire).
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    time: Option<String>,
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    precipitation: f64,
}

/// Resolver backed by the public geocoding and weather providers.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    client: Client,
    geocoder_url: String,
    weather_url: String,
}

impl LocationResolver {
    #[must_use]
    pub fn new(client: Client, geocoder_url: impl Into<String>, weather_url: impl Into<String>) -> Self {
        Self {
            client,
            geocoder_url: geocoder_url.into().trim_end_matches('/').to_string(),
            weather_url: weather_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a place name to its single best match.
    ///
    /// # Errors
    ///
    /// `ResolutionNotFound` when the geocoder returns no match, otherwise the
    /// underlying transport or parse error.
    #[instrument(skip(self))]
    pub async fn geocode(&self, query: &str) -> Result<GeocodeMatch, PyroguardError> {
        let url = format!("{}/search", self.geocoder_url);
        debug!("geocoding via {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("q", query), ("limit", "1")])
            .send()
            .await?;
        let places: Vec<NominatimPlace> = decode_json(response).await?;

        let Some(place) = places.into_iter().next() else {
            return Err(PyroguardError::ResolutionNotFound {
                query: query.to_string(),
            });
        };

        let lat = parse_coordinate(&place.lat)?;
        let lon = parse_coordinate(&place.lon)?;
        Ok(GeocodeMatch {
            lat,
            lon,
            display_name: place.display_name,
        })
    }

    /// Fetch current conditions at a coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    #[instrument(skip(self))]
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<OpenMeteoCurrent, PyroguardError> {
        let url = format!("{}/v1/forecast", self.weather_url);
        debug!("fetching current weather via {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("current", CURRENT_VARIABLES.to_string()),
                ("wind_speed_unit", "kmh".to_string()),
            ])
            .send()
            .await?;
        let body: OpenMeteoResponse = decode_json(response).await?;
        Ok(body.current)
    }
}

impl LocationLookup for LocationResolver {
    async fn resolve(&self, query: String) -> Result<WeatherObservation, PyroguardError> {
        let outcome: Result<WeatherObservation, PyroguardError> = async {
            let place = self.geocode(&query).await?;
            let current = self.current_weather(place.lat, place.lon).await?;
            Ok(assemble(&place, &current))
        }
        .await;

        outcome.map_err(PyroguardError::into_resolution)
    }
}

fn parse_coordinate(raw: &str) -> Result<f64, PyroguardError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| PyroguardError::ResolutionTransport(format!("bad coordinate '{raw}': {e}")))
}

fn assemble(place: &GeocodeMatch, current: &OpenMeteoCurrent) -> WeatherObservation {
    WeatherObservation {
        temperature: current.temperature_2m,
        humidity: current.relative_humidity_2m,
        wind_speed: current.wind_speed_10m,
        rainfall: current.precipitation,
        lat: place.lat,
        lng: place.lon,
        place_name: short_place_name(&place.display_name),
        observed_at: current
            .time
            .as_deref()
            .and_then(|t| NaiveDateTime::parse_from_str(t, OBSERVATION_TIME_FORMAT).ok()),
    }
}

/// First comma-delimited segment of a geocoder display name.
#[must_use]
pub fn short_place_name(display_name: &str) -> String {
    display_name
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use serde_json::json;

    use crate::client::{http_client, testing};

    fn paris_search() -> Router {
        Router::new().route(
            "/search",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.get("q").map(String::as_str) == Some("Paris") {
                    Json(json!([{"lat": "48.8588897", "lon": "2.3200410",
                        "display_name": "Paris, Île-de-France, France"}]))
                } else {
                    Json(json!([]))
                }
            }),
        )
    }

    fn weather_ok() -> serde_json::Value {
        json!({"current": {"time": "2024-07-01T14:00", "temperature_2m": 22.0,
            "relative_humidity_2m": 55, "wind_speed_10m": 10.0, "precipitation": 0.2}})
    }

    async fn resolver(router: Router) -> LocationResolver {
        let base = testing::serve(router).await;
        LocationResolver::new(http_client().expect("client builds"), base.clone(), base)
    }

    #[tokio::test]
    async fn test_resolve_chains_geocode_and_weather() {
        let router = paris_search().route(
            "/v1/forecast",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("wind_speed_unit").map(String::as_str), Some("kmh"));
                Json(weather_ok())
            }),
        );
        let observation = resolver(router)
            .await
            .resolve("Paris".into())
            .await
            .expect("Paris resolves");

        assert_eq!(observation.place_name, "Paris");
        assert!((observation.lng - 2.320_041).abs() < 1e-9);
        assert!((observation.rainfall - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_no_match_skips_weather_lookup() {
        let weather_calls = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&weather_calls);
        let router = paris_search().route(
            "/v1/forecast",
            get(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Json(weather_ok()) }
            }),
        );

        let err = resolver(router)
            .await
            .resolve("Atlantis".into())
            .await
            .expect_err("no such city");

        assert!(matches!(err, PyroguardError::ResolutionNotFound { ref query } if query == "Atlantis"));
        assert_eq!(weather_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_weather_outage_is_transport_failure() {
        let router = paris_search().route(
            "/v1/forecast",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );

        let err = resolver(router)
            .await
            .resolve("Paris".into())
            .await
            .expect_err("weather is down");
        assert!(matches!(err, PyroguardError::ResolutionTransport(_)));
    }

    #[test]
    fn test_short_place_name() {
        assert_eq!(
            short_place_name("Paris, Île-de-France, France métropolitaine, France"),
            "Paris"
        );
        assert_eq!(short_place_name("Nowhere"), "Nowhere");
    }

    #[test]
    fn test_parse_nominatim_and_open_meteo() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"place_id":1,"lat":"48.8588897","lon":"2.3200410","display_name":"Paris, France"}]"#,
        )
        .expect("failed to parse geocoder response");
        let place = GeocodeMatch {
            lat: parse_coordinate(&places[0].lat).expect("numeric lat"),
            lon: parse_coordinate(&places[0].lon).expect("numeric lon"),
            display_name: places[0].display_name.clone(),
        };

        let weather: OpenMeteoResponse = serde_json::from_str(
            r#"{"latitude":48.86,"longitude":2.32,"current":{"time":"2024-07-01T14:00","interval":900,
                "temperature_2m":22.0,"relative_humidity_2m":55,"wind_speed_10m":10.0,"precipitation":0.0}}"#,
        )
        .expect("failed to parse weather response");

        let observation = assemble(&place, &weather.current);
        assert_eq!(observation.place_name, "Paris");
        assert!((observation.lat - 48.858_889_7).abs() < 1e-9);
        assert!((observation.humidity - 55.0).abs() < f64::EPSILON);
        assert!(observation.observed_at.is_some());
    }

    #[test]
    fn test_bad_coordinate_is_transport_failure() {
        assert!(matches!(
            parse_coordinate("north"),
            Err(PyroguardError::ResolutionTransport(_))
        ));
    }
}
