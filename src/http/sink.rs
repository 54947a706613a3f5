//! Wire diagnostics
//!
//! A `WireSink` sees the exact bytes handed to the socket and the decoded
//! text of every response, for request/response logging.

use log::trace;

/// Target used by `LogSink`
pub const WIRE_LOG_TARGET: &str = "rawhttp::wire";

/// Observer of traffic on the wire
pub trait WireSink: Send + Sync {
    /// Bytes about to be written
    fn sent(&self, bytes: &[u8]);

    /// Text assembled from a response
    fn received(&self, text: &str);
}

/// Logs traffic at trace level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl WireSink for LogSink {
    fn sent(&self, bytes: &[u8]) {
        trace!(target: WIRE_LOG_TARGET, "Sending: {:?}", String::from_utf8_lossy(bytes));
    }

    fn received(&self, text: &str) {
        trace!(target: WIRE_LOG_TARGET, "Received: {:?}", text);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl WireSink for NoopSink {
    fn sent(&self, _bytes: &[u8]) {}

    fn received(&self, _text: &str) {}
}
