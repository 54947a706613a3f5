//! TLS support for target connections
//!
//! Client-side TLS on top of OpenSSL, using the session operations
//! abstraction:
//!
//! 1. `TlsConfig` holds the OpenSSL context (verification mode, client
//!    certificate, ALPN) and is built once per session
//! 2. `TlsSessionOps` implements `SessionOps` for encrypted I/O
//! 3. Everything above the session is unaware of the difference
//!
//! Certificate validation is optional: fault-injection targets commonly run
//! with self-signed certificates.
//!
//! # Examples
//!
//! ```no_run
//! use rawhttp::http::tls::TlsConfig;
//! use std::net::TcpStream;
//!
//! let tls_config = TlsConfig::client()
//!     .unwrap()
//!     .servername("example.com")
//!     .verify_peer(true)
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = TcpStream::connect("example.com:443").unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! ```

pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
