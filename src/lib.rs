//! rawhttp - raw HTTP transport for fault-injection tools
//!
//! This crate sends caller-built HTTP request text to a target over plain
//! TCP, TLS or HTTP/2 and returns whatever comes back, classifying
//! timeouts and connection resets instead of failing on them.
//!
//! - [`config`]: TOML-backed transport settings
//! - [`net`]: socket setup and the shared send throttle
//! - [`http`]: framing, response assembly, retry and the transport facade

pub mod config;
pub mod http;
pub mod net;
