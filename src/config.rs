// ⚙️ Configuration - environment (+ optional .env), nothing compiled in

use crate::ai::{AiCollaborator, GeminiClient, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL};
use crate::session::EnrichmentOptions;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_DATA_FILE: &str = "rescue_requests.csv";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Environment keys
pub const ENV_DATA_FILE: &str = "RESCUE_DATA_FILE";
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_ENDPOINT: &str = "GEMINI_ENDPOINT";
pub const ENV_TIMEOUT: &str = "GEMINI_TIMEOUT_SECS";
pub const ENV_ENRICH_ADDRESS: &str = "RESCUE_ENRICH_ADDRESS";
pub const ENV_ENRICH_REGION: &str = "RESCUE_ENRICH_REGION";
pub const ENV_ENRICH_GEOCODE: &str = "RESCUE_ENRICH_GEOCODE";
pub const ENV_BIND_ADDR: &str = "RESCUE_BIND_ADDR";
pub const ENV_LOG_JSON: &str = "RESCUE_LOG_JSON";

#[derive(Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub data_file: PathBuf,
    /// None when no API key is configured; enrichment is then skipped.
    pub gemini: Option<GeminiConfig>,
    pub enrichment: EnrichmentOptions,
    pub bind_addr: String,
    pub log_json: bool,
}

impl AppConfig {
    /// Read configuration from the process environment, loading `.env` first
    /// when one exists.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("Failed to load .env file"),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let gemini = match get(ENV_API_KEY) {
            Some(api_key) => Some(GeminiConfig {
                api_key,
                model: get(ENV_MODEL).unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                endpoint: get(ENV_ENDPOINT).unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string()),
                timeout_secs: match get(ENV_TIMEOUT) {
                    Some(raw) => raw
                        .parse()
                        .with_context(|| format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT, raw))?,
                    None => DEFAULT_TIMEOUT_SECS,
                },
            }),
            None => None,
        };

        let defaults = EnrichmentOptions::default();
        let enrichment = EnrichmentOptions {
            improve_address: parse_flag(ENV_ENRICH_ADDRESS, get(ENV_ENRICH_ADDRESS), defaults.improve_address)?,
            extract_region: parse_flag(ENV_ENRICH_REGION, get(ENV_ENRICH_REGION), defaults.extract_region)?,
            geocode: parse_flag(ENV_ENRICH_GEOCODE, get(ENV_ENRICH_GEOCODE), defaults.geocode)?,
        };

        Ok(Self {
            data_file: get(ENV_DATA_FILE)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
            gemini,
            enrichment,
            bind_addr: get(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            log_json: parse_flag(ENV_LOG_JSON, get(ENV_LOG_JSON), false)?,
        })
    }

    /// Build the AI collaborator, or None when no key is configured.
    pub fn build_collaborator(&self) -> Result<Option<Box<dyn AiCollaborator>>> {
        let Some(gemini) = &self.gemini else {
            info!("no {} configured, AI enrichment disabled", ENV_API_KEY);
            return Ok(None);
        };

        let client = GeminiClient::with_options(
            gemini.api_key.clone(),
            gemini.model.clone(),
            gemini.endpoint.clone(),
            Duration::from_secs(gemini.timeout_secs),
        )
        .map_err(|e| anyhow!("Failed to create Gemini client: {}", e))?;

        info!(model = client.model(), "AI enrichment enabled");
        Ok(Some(Box::new(client)))
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(raw) = value else {
        return Ok(default);
    };

    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean, got {:?}", key, raw)),
    }
}
