use std::net::SocketAddr;
use std::time::Duration;

use tagline_common::openai::OpenAiClientConfig;

use crate::error::AppError;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8788";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded once from environment variables.
///
/// `OPENAI_API_KEY` is deliberately optional here: a missing key is reported
/// per request as a 500 rather than preventing startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds to (`BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Chat model used for every completion call (`OPENAI_MODEL`).
    pub model: String,
    /// Timeout for fetching source pages (`FETCH_TIMEOUT_SECS`).
    pub fetch_timeout: Duration,
    /// Completion service connection settings (`OPENAI_*`).
    pub openai: OpenAiClientConfig,
}

impl Config {
    /// Optional:
    /// - `BIND_ADDR`: listen address (default `0.0.0.0:8788`)
    /// - `OPENAI_MODEL`: model id (default `gpt-4o-mini`)
    /// - `FETCH_TIMEOUT_SECS`: page fetch timeout (default 20)
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_TIMEOUT_SECS`, `OPENAI_MAX_RETRIES`,
    ///   `OPENAI_RETRY_INITIAL_MS`, `OPENAI_RETRY_MAX_MS`, `OPENAI_MAX_ERROR_BODY_BYTES`
    pub fn from_env() -> Result<Self, AppError> {
        let raw_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("invalid BIND_ADDR {raw_addr:?}: {e}")))?;

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let fetch_timeout = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(20));

        Ok(Self {
            bind_addr,
            model,
            fetch_timeout,
            openai: OpenAiClientConfig::from_env(),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.openai.has_api_key()
    }
}
