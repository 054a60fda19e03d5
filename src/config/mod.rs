//! Client configuration (layered: code > env).

use std::sync::OnceLock;
use std::time::Duration;

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<RunClientConfig> = OnceLock::new();

const DEFAULT_BASE_URL: &str = "http://localhost:8787/api";

/// Configuration for the run client.
#[derive(Debug, Clone)]
pub struct RunClientConfig {
    /// Base URL of the execution service.
    pub base_url: String,
    /// TCP connect timeout. There is deliberately no overall request
    /// timeout: streams stay open as long as the server sends
    /// heartbeats, and timeout semantics belong to the transport.
    pub connect_timeout: Duration,
}

impl Default for RunClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RunClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Load from environment (`PROMPTRUN_BASE_URL`), reading `.env` if
    /// present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let base_url = std::env::var("PROMPTRUN_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static RunClientConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Endpoint that opens an execution stream.
    pub fn execute_url(&self) -> String {
        format!("{}/runs/execute", self.base_url)
    }

    /// Endpoint that cancels an in-flight remote response.
    pub fn cancel_url(&self) -> String {
        format!("{}/runs/cancel", self.base_url)
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_join_cleanly() {
        let config = RunClientConfig::new("https://api.example.com/v1/");
        assert_eq!(config.execute_url(), "https://api.example.com/v1/runs/execute");
        assert_eq!(config.cancel_url(), "https://api.example.com/v1/runs/cancel");
    }
}
