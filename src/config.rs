use serde::Deserialize;
use std::path::Path;

/// Server configuration loaded from config.yaml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins; required unless cors_permissive is set
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Allow all origins (development only)
    #[serde(default)]
    pub cors_permissive: bool,
    pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
    /// Minimum spacing between ANY two outbound provider requests, shared
    /// across address lookup, geocoding and leg fetches
    #[serde(default = "default_min_interval")]
    pub min_request_interval_ms: u64,
    /// Request timeout applied to every provider client
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    pub cep: CepProvider,
    pub geocoder: GeocoderProvider,
    pub router: RouterProvider,
    pub reasoning: ReasoningProvider,
}

/// Address-by-postal-code provider (ViaCEP-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct CepProvider {
    pub base_url: String,
}

/// Coordinate search provider (Nominatim-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderProvider {
    pub base_url: String,
    /// Identifying client tag sent as User-Agent, required by the
    /// provider's anonymous usage policy
    pub user_agent: String,
}

/// Route-leg provider (OSRM-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct RouterProvider {
    pub base_url: String,
    #[serde(default = "default_profile")]
    pub profile: String,
}

/// Reasoning provider for advisory route plans (chat-completions API)
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningProvider {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Seconds to wait for a plan before falling back to identity order
    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_min_interval() -> u64 {
    1100
}

fn default_timeout() -> u64 {
    30
}

fn default_profile() -> String {
    "driving".to_string()
}

fn default_api_key_env() -> String {
    "REASONING_API_KEY".to_string()
}

fn default_reasoning_timeout() -> u64 {
    60
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(path.as_ref().display().to_string(), e))?;
        let config: Config = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, #[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
