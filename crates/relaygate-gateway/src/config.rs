//! Gateway configuration.
//!
//! Configuration is read once at startup: an optional JSON file named by
//! `RELAYGATE_CONFIG`, then environment overrides. Every field has a default,
//! so an empty file (or none at all) yields a working local setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use relaygate_auth::AuthConfig;
use relaygate_control::{ControlConfig, ProviderConfig};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_VAR: &str = "RELAYGATE_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`GatewayConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// `RocksDB` data directory.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: String,

    /// Allowed CORS origins.
    #[serde(default = "GatewayConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Admission latency above which a warning is logged, in milliseconds.
    #[serde(default = "GatewayConfig::default_slow_request_threshold")]
    pub slow_request_threshold_ms: u64,

    /// Interval between stale-task sweeps, in seconds.
    #[serde(default = "GatewayConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Bearer token validation.
    #[serde(default)]
    pub auth: AuthConfig,

    /// AI provider connection.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Limits, retries, timeouts, and prices.
    #[serde(default)]
    pub control: ControlConfig,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> String {
        "/data/relaygate".to_string()
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_slow_request_threshold() -> u64 {
        2000
    }

    const fn default_sweep_interval() -> u64 {
        60
    }

    /// Load from `RELAYGATE_CONFIG` (if set) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the named file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse a JSON config document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid config.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = lookup("PROVIDER_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = lookup("PROVIDER_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = lookup("PROVIDER_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = lookup("AUTH_ISSUER") {
            self.auth.issuer = v;
        }
        if let Some(v) = lookup("AUTH_JWKS_URL") {
            self.auth.jwks_url = v;
        }
        if let Some(v) = lookup("AUTH_AUDIENCE") {
            self.auth.audience = v;
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the slow request threshold as a `Duration`.
    #[must_use]
    pub const fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms)
    }

    /// Get the sweep interval as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            cors_origins: Self::default_cors_origins(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            slow_request_threshold_ms: Self::default_slow_request_threshold(),
            sweep_interval_seconds: Self::default_sweep_interval(),
            auth: AuthConfig::default(),
            provider: ProviderConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.slow_request_threshold(), Duration::from_millis(2000));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = GatewayConfig::from_json("{}").unwrap();
        assert_eq!(config.data_dir, "/data/relaygate");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.control.circuit.failure_threshold, 5);
    }

    #[test]
    fn nested_sections_parse() {
        let config = GatewayConfig::from_json(
            r#"{
                "listen_addr": "127.0.0.1:9000",
                "control": {
                    "circuit": { "failure_threshold": 3, "reset_timeout_seconds": 10 },
                    "rate_limits": { "default": { "requests": 3, "window_seconds": 60 } }
                },
                "provider": { "model": "gpt-4o" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.control.circuit.failure_threshold, 3);
        assert_eq!(config.control.rate_limits.default.requests, 3);
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.provider.request_timeout_seconds, 60);
    }

    #[test]
    fn env_overrides_win() {
        let env = HashMap::from([
            ("DATA_DIR", "/tmp/rg"),
            ("PROVIDER_API_KEY", "sk-test"),
            ("AUTH_AUDIENCE", "internal"),
        ]);
        let mut config = GatewayConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.data_dir, "/tmp/rg");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.auth.audience, "internal");
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn malformed_document_is_rejected() {
        assert!(matches!(
            GatewayConfig::from_json("{\"max_body_bytes\": \"big\"}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = GatewayConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
