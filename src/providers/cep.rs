use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::Address;
use crate::providers::gate::RequestGate;

#[derive(Debug, Error)]
pub enum CepError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    /// The provider had no record for this code. Not a failure of the
    /// batch: the caller skips coordinate lookup and moves on.
    #[error("Postal code not found")]
    NotFound,
}

/// Client for the address-by-postal-code provider (ViaCEP-compatible)
pub struct CepClient {
    client: Client,
    base_url: String,
    gate: Arc<RequestGate>,
}

impl CepClient {
    pub fn new(
        base_url: String,
        timeout: Duration,
        gate: Arc<RequestGate>,
    ) -> Result<Self, CepError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CepError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            gate,
        })
    }

    /// Look up the address for a normalized 8-digit postal code
    pub async fn lookup(&self, code: &str) -> Result<Address, CepError> {
        self.gate.acquire().await;

        let url = format!("{}/{}/json/", self.base_url, urlencoding::encode(code));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CepError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CepError::ApiError(format!("HTTP error: {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CepError::NetworkError(e.to_string()))?;

        let payload: CepResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                code,
                error = %e,
                "Failed to parse postal code response - body: {}",
                super::log_excerpt(&body)
            );
            CepError::ParseError(e.to_string())
        })?;

        // The provider answers 200 with {"erro": true} for unknown codes
        if payload.erro.unwrap_or(false) {
            return Err(CepError::NotFound);
        }

        Ok(Address {
            postal_code: code.to_string(),
            street: payload.logradouro.unwrap_or_default(),
            district: payload.bairro.unwrap_or_default(),
            city: payload.localidade.unwrap_or_default(),
            state: payload.uf.unwrap_or_default(),
            coordinates: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CepResponse {
    #[serde(default)]
    logradouro: Option<String>,
    #[serde(default)]
    bairro: Option<String>,
    #[serde(default)]
    localidade: Option<String>,
    #[serde(default)]
    uf: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    erro: Option<bool>,
}

/// The provider has historically sent `"erro": true` and `"erro": "true"`
fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    let value: Option<BoolOrString> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        BoolOrString::Bool(b) => b,
        BoolOrString::Str(s) => s == "true",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_address_payload() {
        let body = r#"{
            "cep": "01310-100",
            "logradouro": "Avenida Paulista",
            "complemento": "612",
            "bairro": "Bela Vista",
            "localidade": "São Paulo",
            "uf": "SP"
        }"#;
        let payload: CepResponse = serde_json::from_str(body).unwrap();
        assert_eq!(payload.logradouro.as_deref(), Some("Avenida Paulista"));
        assert_eq!(payload.erro, None);
    }

    #[test]
    fn parses_erro_as_bool_and_string() {
        let b: CepResponse = serde_json::from_str(r#"{"erro": true}"#).unwrap();
        assert_eq!(b.erro, Some(true));
        let s: CepResponse = serde_json::from_str(r#"{"erro": "true"}"#).unwrap();
        assert_eq!(s.erro, Some(true));
    }
}
