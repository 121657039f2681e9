use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Coordinates, RouteLeg};
use crate::providers::gate::RequestGate;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    /// The provider could not route between the two points
    #[error("No route between the given points")]
    NoRoute,
}

/// Client for the route-leg provider (OSRM-compatible)
pub struct RoutingClient {
    client: Client,
    base_url: String,
    profile: String,
    gate: Arc<RequestGate>,
}

impl RoutingClient {
    pub fn new(
        base_url: String,
        profile: String,
        timeout: Duration,
        gate: Arc<RequestGate>,
    ) -> Result<Self, RoutingError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                RoutingError::NetworkError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            profile,
            gate,
        })
    }

    /// Fetch one leg from origin to destination with full-fidelity geometry
    pub async fn route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
    ) -> Result<RouteLeg, RoutingError> {
        self.gate.acquire().await;

        let url = format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}?overview=full&geometries=geojson",
            self.base_url, self.profile, origin.lon, origin.lat, destination.lon, destination.lat
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RoutingError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutingError::ApiError(format!(
                "HTTP error: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RoutingError::NetworkError(e.to_string()))?;

        let payload: RouteResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                error = %e,
                "Failed to parse routing response - body: {}",
                super::log_excerpt(&body)
            );
            RoutingError::ParseError(e.to_string())
        })?;

        if payload.code.as_deref() != Some("Ok") {
            return Err(RoutingError::NoRoute);
        }

        let route = payload.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;

        Ok(RouteLeg {
            distance_meters: route.distance,
            duration_seconds: route.duration,
            geometry: route.geometry.coordinates,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    distance: f64,
    duration: f64,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// [lon, lat] pairs, GeoJSON order
    coordinates: Vec<[f64; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_payload() {
        let body = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 1523.4,
                "duration": 312.8,
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[-46.6565, -23.5613], [-46.6601, -23.5632]]
                }
            }]
        }"#;
        let payload: RouteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(payload.code.as_deref(), Some("Ok"));
        assert_eq!(payload.routes[0].geometry.coordinates.len(), 2);
    }

    #[test]
    fn no_route_payload_has_no_routes() {
        let body = r#"{"code": "NoRoute", "routes": []}"#;
        let payload: RouteResponse = serde_json::from_str(body).unwrap();
        assert_ne!(payload.code.as_deref(), Some("Ok"));
    }
}
