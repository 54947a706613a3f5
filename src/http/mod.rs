//! Raw HTTP transport
//!
//! This module sends caller-supplied HTTP/1.1 text over a plain or TLS
//! socket and reassembles whatever comes back, without validating either
//! side against the protocol. The caller owns header and body content,
//! including deliberately wrong lengths.
//!
//! # Architecture
//!
//! The layers, leaves first:
//!
//! - `SessionOps` abstracts plain and TLS I/O; `SocketSession` owns one
//!   connection and its connect/reconnect/close lifecycle
//! - `MessageFramer` finalizes outgoing bytes (Content-Length, User-Agent)
//! - `ResponseAssembler` reads until a complete response is buffered
//! - `RetryPolicy` drives one attempt plus at most one reconnect-and-retry
//! - `HttpTransport` picks the raw-socket or HTTP/2 backend from config
//!
//! # Examples
//!
//! ```no_run
//! use rawhttp::config::TransportConfig;
//! use rawhttp::http::HttpTransport;
//! use rawhttp::net::Throttle;
//! use std::sync::Arc;
//!
//! let config = TransportConfig::load("transport.toml").unwrap();
//! let throttle = Arc::new(Throttle::new(config.throttle_interval()));
//! let mut transport = HttpTransport::new(&config, throttle).unwrap();
//!
//! let (ok, response) = transport
//!     .send_recv("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n", 10)
//!     .unwrap();
//! println!("{} {:?}", ok, response.status_code());
//! ```

pub mod assembler;
pub mod decode;
pub mod framer;
pub mod h2;
pub mod headers;
pub mod response;
pub mod retry;
pub mod session;
pub mod sink;
pub mod tls;
pub mod transport;

pub use assembler::ResponseAssembler;
pub use decode::{DecodePolicy, TextDecoder};
pub use framer::MessageFramer;
pub use headers::HeaderBlock;
pub use response::{Response, CONNECTION_CLOSED_CODE, TIMEOUT_CODE};
pub use retry::{Exchange, RawSocketBackend, RetryPolicy};
pub use session::{SessionOps, SessionState, SocketSession};
pub use sink::{LogSink, NoopSink, WireSink};
pub use transport::{Backend, HttpTransport};

use std::io;
use std::time::Duration;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Exception creating socket: {0}")]
    Network(#[from] crate::net::Error),

    #[error("Exception creating socket: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("Message has no header/body delimiter")]
    MissingDelimiter,

    #[error("Exception sending data: {0}")]
    Send(#[source] io::Error),

    #[error("Exception receiving data: {0}")]
    Receive(#[source] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Classification of a failed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A read exceeded its deadline
    Timeout,
    /// The peer reset or aborted the connection
    ConnectionClosed,
    /// Response bytes were not valid UTF-8 and tolerance was off
    Decode,
    /// Anything else
    Other,
}

/// OS error codes meaning the peer tore down the connection:
/// WSAECONNRESET, WSAECONNABORTED (Windows) and ECONNRESET (Linux)
const CONNECTION_CLOSED_OS_ERRORS: &[i32] = &[10054, 10053, 104];

impl Error {
    /// Errors that are never retried and surface as `Err` from `send_recv`
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Tls(_) | Error::MissingDelimiter
        )
    }

    /// Classify for the retry policy
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Timeout(_) => FailureKind::Timeout,
            Error::ConnectionClosed => FailureKind::ConnectionClosed,
            Error::Decode(_) => FailureKind::Decode,
            Error::Io(e) | Error::Send(e) | Error::Receive(e) => classify_io(e),
            _ => classify_text(&self.to_string()),
        }
    }
}

fn classify_io(e: &io::Error) -> FailureKind {
    if let Some(code) = e.raw_os_error() {
        if CONNECTION_CLOSED_OS_ERRORS.contains(&code) {
            return FailureKind::ConnectionClosed;
        }
    }
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
        // TLS errors arrive wrapped; the OS code only survives in the text
        _ => classify_text(&e.to_string()),
    }
}

fn classify_text(text: &str) -> FailureKind {
    if text.contains("timed out") {
        return FailureKind::Timeout;
    }
    let closed = CONNECTION_CLOSED_OS_ERRORS
        .iter()
        .any(|code| text.contains(&format!("os error {})", code)));
    if closed {
        FailureKind::ConnectionClosed
    } else {
        FailureKind::Other
    }
}

/// Header/body delimiter
pub const DELIM: &str = "\r\n\r\n";

/// CRLF line ending
pub const CRLF: &str = "\r\n";
