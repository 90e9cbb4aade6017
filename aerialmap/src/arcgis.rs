//! ArcGIS World Geocoding Service client.
//!
//! Provides forward and reverse geocoding against the public
//! `GeocodeServer` REST endpoints.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geocode::{coordinate_key, Geocoder};

pub const ARCGIS_BASE_URL: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOCATIONS: &str = "10";

/// Blocking client for the ArcGIS geocoding REST API.
#[derive(Debug)]
pub struct ArcGisGeocoder {
    base_url: String,
    client: Client,
}

impl ArcGisGeocoder {
    /// Creates a client for the public World Geocoding Service.
    pub fn new() -> Result<Self> {
        Self::with_base_url(ARCGIS_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Creates a client for a specific `GeocodeServer` endpoint.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::geocode(&base_url, format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get_json(&self, operation: &str, query: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, operation);
        debug!("GET {url} for {query:?}");
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::geocode(query, format!("request failed: {e}")))?;
        let body: Value = response
            .json()
            .map_err(|e| Error::geocode(query, format!("failed to parse response: {e}")))?;
        check_service_error(query, body)
    }
}

/// ArcGIS reports failures as `{"error": {"code": .., "message": ..}}` with HTTP 200.
fn check_service_error(query: &str, body: Value) -> Result<Value> {
    match body.get("error") {
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown service error");
            Err(Error::geocode(query, message))
        }
        None => Ok(body),
    }
}

impl Geocoder for ArcGisGeocoder {
    fn geocode(&mut self, address: &str) -> Result<Value> {
        let body = self.get_json(
            "findAddressCandidates",
            address,
            &[
                ("SingleLine", address),
                ("f", "json"),
                ("outFields", "*"),
                ("maxLocations", MAX_LOCATIONS),
            ],
        )?;
        body.get("candidates")
            .cloned()
            .ok_or_else(|| Error::geocode(address, "response has no candidates"))
    }

    fn reverse_geocode(&mut self, longitude: f64, latitude: f64) -> Result<Value> {
        let location = format!("{longitude},{latitude}");
        self.get_json(
            "reverseGeocode",
            &coordinate_key(longitude, latitude),
            &[("location", location.as_str()), ("f", "json")],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_errors_become_geocode_errors() {
        let body = json!({ "error": { "code": 400, "message": "Cannot perform query" } });
        let err = check_service_error("nowhere", body).unwrap_err();
        assert!(err.to_string().contains("Cannot perform query"));

        let ok = json!({ "address": { "Subregion": "Oakland County" } });
        assert_eq!(check_service_error("somewhere", ok.clone()).unwrap(), ok);
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let geocoder =
            ArcGisGeocoder::with_base_url("http://localhost:9/GeocodeServer/", DEFAULT_TIMEOUT)
                .unwrap();
        assert_eq!(geocoder.base_url, "http://localhost:9/GeocodeServer");
    }
}
