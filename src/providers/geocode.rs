use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::Coordinates;
use crate::providers::gate::RequestGate;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
}

/// One query form tried by the resolution cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeQuery {
    /// Structured search by cleaned street + city + state
    Structured {
        street: String,
        city: String,
        state: String,
    },
    /// Search by postal code alone; coarse but stable when street names
    /// disagree between providers
    PostalCode(String),
    /// Free-text search
    FreeText(String),
}

impl GeocodeQuery {
    /// Query-string parameters for the provider's /search endpoint
    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            GeocodeQuery::Structured { street, city, state } => vec![
                ("street", street.clone()),
                ("city", city.clone()),
                ("state", state.clone()),
            ],
            GeocodeQuery::PostalCode(code) => vec![
                ("postalcode", code.clone()),
                ("country", "Brazil".to_string()),
            ],
            GeocodeQuery::FreeText(q) => vec![("q", q.clone())],
        }
    }
}

/// Client for the coordinate-by-query provider (Nominatim-compatible)
///
/// The provider's anonymous usage policy requires an identifying client tag
/// and a strict request rate; callers must share one [`RequestGate`].
pub struct GeocodeClient {
    client: Client,
    base_url: String,
    gate: Arc<RequestGate>,
}

impl GeocodeClient {
    pub fn new(
        base_url: String,
        user_agent: &str,
        timeout: Duration,
        gate: Arc<RequestGate>,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                GeocodeError::NetworkError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            gate,
        })
    }

    /// Run one search query; an empty list means the provider had no match
    pub async fn search(&self, query: &GeocodeQuery) -> Result<Vec<Coordinates>, GeocodeError> {
        self.gate.acquire().await;

        let mut url = format!("{}/search?format=json&limit=1", self.base_url);
        for (key, value) in query.params() {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(&value));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeocodeError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::ApiError(format!(
                "HTTP error: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GeocodeError::NetworkError(e.to_string()))?;

        let places: Vec<GeocodePlace> = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                ?query,
                error = %e,
                "Failed to parse geocoder response - body: {}",
                super::log_excerpt(&body)
            );
            GeocodeError::ParseError(e.to_string())
        })?;

        // The provider returns coordinates as strings; keep only results
        // where both parse as finite numbers
        Ok(places
            .into_iter()
            .filter_map(|p| p.coordinates())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct GeocodePlace {
    lat: String,
    lon: String,
}

impl GeocodePlace {
    fn coordinates(&self) -> Option<Coordinates> {
        let lat: f64 = self.lat.parse().ok()?;
        let lon: f64 = self.lon.parse().ok()?;
        let coords = Coordinates { lat, lon };
        coords.is_finite().then_some(coords)
    }
}
