//! HTTP/2 transport
//!
//! An alternative backend for targets that should be exercised over
//! HTTP/2. Callers still hand in HTTP/1.1-style text; `H2Backend` maps it
//! onto a single request stream and renders the reply back as
//! `HTTP/2 <status>` text, so responses look the same to the caller
//! whichever backend produced them.
//!
//! Frames are built and parsed directly with [`codec::FrameCodec`]; header
//! compression uses the `hpack` crate. One request is in flight at a time,
//! so no stream multiplexing or send-side flow control is needed.

pub mod client;
pub mod codec;

pub use client::{H2Backend, H2Request, ALPN_H2};
pub use codec::{Frame, FrameCodec, FrameFlags, FrameType};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 9113 Section 3.4:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

/// Largest stream identifier (31 bits)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Connection-specific headers that HTTP/2 forbids, plus Host, which
/// becomes `:authority`
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "host",
];
