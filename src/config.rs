use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ticketmaster: TicketmasterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketmasterConfig {
    pub base_url: String,
    pub page_size: u32,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Resolve the API credential from the environment (loaded from .env if present).
    /// The credential is required up front; a missing key must fail at
    /// construction time, not on the first request.
    pub fn api_key() -> Result<String> {
        dotenv::dotenv().ok();
        match env::var("TICKETMASTER_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(PipelineError::Config(
                "TICKETMASTER_API_KEY not set".to_string(),
            )),
        }
    }
}
