//! Transport configuration
//!
//! `TransportConfig` is the deserialized settings file; `ConnectionSettings`
//! is the immutable per-session view derived from it.

use crate::http::decode::DecodePolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default port for plain connections
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default port for TLS connections
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP version used to talk to the target; selects the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum HttpVersion {
    #[default]
    #[serde(rename = "1.1")]
    Http11,
    #[serde(rename = "2", alias = "2.0")]
    Http2,
}

/// Transport settings as read from a TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub target_host: String,
    /// Defaults to 443 with TLS, 80 otherwise
    pub target_port: Option<u16>,
    /// SNI / certificate host name; defaults to `target_host`
    pub server_name: Option<String>,
    pub use_ssl: bool,
    pub disable_cert_validation: bool,
    pub client_certificate_path: Option<PathBuf>,
    pub client_certificate_key_path: Option<PathBuf>,
    pub include_user_agent: bool,
    pub user_agent_product: String,
    pub version: String,
    pub request_throttle_ms: Option<u64>,
    pub ignore_decoding_failures: bool,
    pub http_version: HttpVersion,
    /// Per-read timeout in seconds
    pub max_request_execution_time: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            target_host: "127.0.0.1".to_string(),
            target_port: None,
            server_name: None,
            use_ssl: false,
            disable_cert_validation: false,
            client_certificate_path: None,
            client_certificate_key_path: None,
            include_user_agent: true,
            user_agent_product: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            request_throttle_ms: None,
            ignore_decoding_failures: false,
            http_version: HttpVersion::Http11,
            max_request_execution_time: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl TransportConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: TransportConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_host.trim().is_empty() {
            return Err(ConfigError::Invalid("target_host is empty".to_string()));
        }
        if self.client_certificate_key_path.is_some() && self.client_certificate_path.is_none() {
            return Err(ConfigError::Invalid(
                "client_certificate_key_path set without client_certificate_path".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective target port
    pub fn port(&self) -> u16 {
        self.target_port.unwrap_or(if self.use_ssl {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        })
    }

    /// Per-session connection settings
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            target_host: self.target_host.clone(),
            target_port: self.port(),
            server_name: self.server_name.clone(),
            use_tls: self.use_ssl,
            disable_cert_validation: self.disable_cert_validation,
            client_cert: self.client_certificate_path.clone(),
            client_key: self.client_certificate_key_path.clone(),
            include_user_agent: self.include_user_agent,
            user_agent: format!("{}/{}", self.user_agent_product, self.version),
        }
    }

    /// How undecodable response bytes are treated
    pub fn decode_policy(&self) -> DecodePolicy {
        if self.ignore_decoding_failures {
            DecodePolicy::Ignore
        } else {
            DecodePolicy::Strict
        }
    }

    /// Minimum spacing between sends
    pub fn throttle_interval(&self) -> Option<Duration> {
        self.request_throttle_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }

    /// Per-read timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.max_request_execution_time)
    }
}

/// Settings for one socket session, fixed for its lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub target_host: String,
    pub target_port: u16,
    pub server_name: Option<String>,
    pub use_tls: bool,
    pub disable_cert_validation: bool,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub include_user_agent: bool,
    /// `product/version` value for the injected User-Agent header
    pub user_agent: String,
}

impl ConnectionSettings {
    /// Plain-TCP settings for `host:port` with no header injection besides
    /// Content-Length
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionSettings {
            target_host: host.into(),
            target_port: port,
            server_name: None,
            use_tls: false,
            disable_cert_validation: false,
            client_cert: None,
            client_key: None,
            include_user_agent: false,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }

    /// Name used for SNI and certificate checks
    pub fn server_name(&self) -> &str {
        self.server_name.as_deref().unwrap_or(&self.target_host)
    }
}
