//! Transport response
//!
//! A response is either the raw text read off the wire, with its status
//! code taken from the status line, or a synthetic failure carrying the
//! error text and, for timeouts and peer resets, a sentinel status code.

use super::{Error, FailureKind, HeaderBlock, DELIM};
use std::fmt;

/// Synthetic status for a read that exceeded its timeout
pub const TIMEOUT_CODE: u16 = 599;

/// Synthetic status for a connection the peer closed or reset
pub const CONNECTION_CLOSED_CODE: u16 = 598;

/// Result of one `send_recv` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: Option<u16>,
    raw: String,
    failure: Option<FailureKind>,
}

impl Response {
    /// Wrap text received from the peer
    pub fn from_wire(raw: String) -> Self {
        let status = HeaderBlock::parse(&raw).status_code();
        Response {
            status,
            raw,
            failure: None,
        }
    }

    /// Build the response for a terminal failure
    pub fn from_error(error: &Error) -> Self {
        let kind = error.failure_kind();
        let status = match kind {
            FailureKind::Timeout => Some(TIMEOUT_CODE),
            FailureKind::ConnectionClosed => Some(CONNECTION_CLOSED_CODE),
            FailureKind::Decode | FailureKind::Other => None,
        };
        Response {
            status,
            raw: error.to_string(),
            failure: Some(kind),
        }
    }

    /// Status code, parsed or synthetic
    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    /// Whether the status was invented by the transport
    pub fn is_synthetic(&self) -> bool {
        matches!(self.status, Some(TIMEOUT_CODE) | Some(CONNECTION_CLOSED_CODE))
            && self.failure.is_some()
    }

    /// Failure classification, `None` for a received response
    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// Full text: header and body, or the error text
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether nothing was received
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Header section, without the delimiter
    pub fn header_text(&self) -> &str {
        match self.raw.find(DELIM) {
            Some(end) => &self.raw[..end],
            None => &self.raw,
        }
    }

    /// Body section; empty if no delimiter was received
    pub fn body(&self) -> &str {
        match self.raw.find(DELIM) {
            Some(end) => &self.raw[end + DELIM.len()..],
            None => "",
        }
    }

    /// Lenient header view
    pub fn headers(&self) -> HeaderBlock<'_> {
        HeaderBlock::parse(self.header_text())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
