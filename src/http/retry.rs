//! Send/receive with a single reconnect-and-retry
//!
//! Each call makes one attempt and, depending on how it failed, at most one
//! more over a fresh connection:
//!
//! | Outcome of an attempt        | First attempt     | Retry attempt          |
//! |------------------------------|-------------------|------------------------|
//! | Response text                | success           | success                |
//! | Empty response               | retry             | success, empty text    |
//! | Timeout                      | failure, 599      | failure, 599           |
//! | Connection closed by peer    | retry             | failure, 598           |
//! | Undecodable bytes            | failure           | failure                |
//! | Any other send/receive error | retry             | failure, error text    |
//! | Setup error / no delimiter   | `Err`             | `Err`                  |

use super::assembler::ResponseAssembler;
use super::decode::DecodePolicy;
use super::framer::{request_method, MessageFramer};
use super::session::SocketSession;
use super::sink::{LogSink, WireSink};
use super::transport::Backend;
use super::{FailureKind, Response, Result};
use crate::config::ConnectionSettings;
use crate::net::Throttle;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Retries allowed per call
pub const MAX_RETRIES: u32 = 1;

/// One send and receive over the target connection
pub trait Exchange {
    /// Send `message` and return the response text
    ///
    /// With `reconnect` set the current connection is dropped and a new one
    /// opened first; otherwise one is opened only if none exists.
    fn exchange(&mut self, message: &str, timeout: Duration, reconnect: bool) -> Result<String>;
}

/// Drives an `Exchange` through the retry rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Policy with the standard retry budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries allowed per call
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run one call
    ///
    /// Returns `(true, response)` on success and `(false, response)` for a
    /// classified failure; only fatal errors come back as `Err`.
    pub fn run<E: Exchange + ?Sized>(
        &self,
        exchange: &mut E,
        message: &str,
        timeout: Duration,
    ) -> Result<(bool, Response)> {
        let mut retries = 0;

        loop {
            let reconnect = retries > 0;
            let can_retry = retries < self.max_retries;

            let error = match exchange.exchange(message, timeout, reconnect) {
                Ok(text) if text.is_empty() && can_retry => {
                    debug!("Empty response received. Re-creating connection and re-trying.");
                    retries += 1;
                    continue;
                }
                Ok(text) => return Ok((true, Response::from_wire(text))),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            match error.failure_kind() {
                FailureKind::Timeout => {
                    debug!("Reached max request timeout of {:?}", timeout);
                    return Ok((false, Response::from_error(&error)));
                }
                FailureKind::Decode => {
                    warn!("Failed to decode response: {}", error);
                    return Ok((false, Response::from_error(&error)));
                }
                FailureKind::ConnectionClosed => debug!("Connection error: {}", error),
                FailureKind::Other => warn!("Unknown error: {}", error),
            }

            if !can_retry {
                return Ok((false, Response::from_error(&error)));
            }

            debug!("Re-creating connection and re-trying.");
            retries += 1;
        }
    }
}

/// HTTP/1.1 backend writing caller text straight to the socket
pub struct RawSocketBackend {
    session: SocketSession,
    framer: MessageFramer,
    throttle: Arc<Throttle>,
    decode_policy: DecodePolicy,
    sink: Arc<dyn WireSink>,
    policy: RetryPolicy,
}

impl RawSocketBackend {
    /// Create a backend; TLS material is loaded now, the socket on first use
    pub fn new(
        settings: ConnectionSettings,
        throttle: Arc<Throttle>,
        decode_policy: DecodePolicy,
    ) -> Result<Self> {
        let framer = MessageFramer::new(&settings);
        let session = SocketSession::new(settings)?;

        Ok(RawSocketBackend {
            session,
            framer,
            throttle,
            decode_policy,
            sink: Arc::new(LogSink),
            policy: RetryPolicy::new(),
        })
    }

    /// Underlying session
    pub fn session(&self) -> &SocketSession {
        &self.session
    }
}

impl Exchange for RawSocketBackend {
    fn exchange(&mut self, message: &str, timeout: Duration, reconnect: bool) -> Result<String> {
        // Frame first: a malformed message must never open a socket
        let wire = self.framer.frame(message)?;

        if reconnect {
            self.session.reconnect()?;
        } else {
            self.session.ensure_connected()?;
        }
        self.session.set_timeout(Some(timeout));

        self.sink.sent(&wire);
        let session = &mut self.session;
        self.throttle.run(|| session.write_all(&wire))?;

        let text = ResponseAssembler::new(&mut self.session, self.decode_policy)
            .read_response(request_method(message))?;
        self.sink.received(&text);

        Ok(text)
    }
}

impl Backend for RawSocketBackend {
    fn send_recv(&mut self, message: &str, timeout: Duration) -> Result<(bool, Response)> {
        let policy = self.policy;
        let result = policy.run(self, message, timeout);

        // Unread bytes from a failed exchange must not leak into the next one
        if matches!(result, Ok((false, _))) {
            self.session.close();
        }

        result
    }

    fn set_sink(&mut self, sink: Arc<dyn WireSink>) {
        self.sink = sink;
    }
}
