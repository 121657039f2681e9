use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::providers::gate::RequestGate;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("Empty completion")]
    EmptyCompletion,
}

/// Client for the reasoning provider (chat-completions API with strict
/// JSON-schema output)
///
/// The provider is an untrusted oracle: this client only transports the
/// request and hands the raw JSON payload back; shape validation and the
/// deterministic fallback belong to the planner.
pub struct ReasoningClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    gate: Arc<RequestGate>,
}

impl ReasoningClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key_env: &str,
        timeout: Duration,
        gate: Arc<RequestGate>,
    ) -> Result<Self, ReasoningError> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| ReasoningError::MissingApiKey(api_key_env.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ReasoningError::NetworkError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
            gate,
        })
    }

    /// Request a completion constrained to the given JSON schema and return
    /// the raw message content
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: Value,
    ) -> Result<String, ReasoningError> {
        self.gate.acquire().await;

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaSpec {
                    name: schema_name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ReasoningError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReasoningError::ApiError(format!(
                "HTTP error: {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ReasoningError::NetworkError(e.to_string()))?;

        let payload: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(
                error = %e,
                "Failed to parse reasoning response - body: {}",
                super::log_excerpt(&body)
            );
            ReasoningError::ParseError(e.to_string())
        })?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ReasoningError::EmptyCompletion)
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaSpec,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_payload() {
        let body = r#"{
            "choices": [
                {"message": {"role": "assistant", "content": "{\"assignments\": []}"}}
            ]
        }"#;
        let payload: CompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            payload.choices[0].message.content,
            "{\"assignments\": []}"
        );
    }

    #[test]
    fn empty_choices_parse_cleanly() {
        let payload: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(payload.choices.is_empty());
    }
}
