//! Transport facade
//!
//! `HttpTransport` is the single entry point: one call sends one raw
//! message and returns a success flag plus the response. The backend is
//! chosen once from the configured HTTP version.

use super::h2::H2Backend;
use super::retry::RawSocketBackend;
use super::sink::WireSink;
use super::{Response, Result};
use crate::config::{HttpVersion, TransportConfig};
use crate::net::Throttle;
use std::sync::Arc;
use std::time::Duration;

/// A way of exchanging raw messages with the target
pub trait Backend: Send {
    /// Send `message` and wait for the response, `timeout` bounding each read
    fn send_recv(&mut self, message: &str, timeout: Duration) -> Result<(bool, Response)>;

    /// Install a wire sink
    fn set_sink(&mut self, sink: Arc<dyn WireSink>);
}

/// Raw HTTP transport to one target
pub struct HttpTransport {
    backend: Box<dyn Backend>,
}

impl HttpTransport {
    /// Create a transport for `config`, sharing `throttle` with other
    /// transports to the same target
    ///
    /// TLS configuration errors surface here; no connection is made yet.
    pub fn new(config: &TransportConfig, throttle: Arc<Throttle>) -> Result<Self> {
        let settings = config.connection_settings();

        let backend: Box<dyn Backend> = match config.http_version {
            HttpVersion::Http11 => Box::new(RawSocketBackend::new(
                settings,
                throttle,
                config.decode_policy(),
            )?),
            HttpVersion::Http2 => Box::new(H2Backend::new(
                settings,
                throttle,
                config.decode_policy(),
            )?),
        };

        Ok(HttpTransport { backend })
    }

    /// Wrap an existing backend
    pub fn from_backend(backend: Box<dyn Backend>) -> Self {
        HttpTransport { backend }
    }

    /// Route wire diagnostics to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn WireSink>) -> Self {
        self.backend.set_sink(sink);
        self
    }

    /// Send one raw message
    ///
    /// `timeout_secs` bounds every individual read, not the whole call.
    /// Returns `(true, response)` on success and `(false, response)` when
    /// the exchange failed; `response` then holds the error text and, for
    /// timeouts and peer resets, a synthetic status code. `Err` is reserved
    /// for connection setup failures and messages without a header/body
    /// delimiter.
    pub fn send_recv(&mut self, message: &str, timeout_secs: u64) -> Result<(bool, Response)> {
        self.backend
            .send_recv(message, Duration::from_secs(timeout_secs))
    }
}
