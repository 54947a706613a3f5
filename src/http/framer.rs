//! Outgoing message finalization
//!
//! The caller's text is sent as-is apart from two header insertions, both
//! placed immediately before the header/body delimiter:
//!
//! - `Content-Length: <body bytes>` when the header has none
//! - `User-Agent: <product>/<version>` when enabled and the header has none
//!
//! An existing Content-Length is never corrected, even if wrong.

use super::{Error, HeaderBlock, Result, CRLF, DELIM};
use crate::config::ConnectionSettings;

/// Finalizes raw message text into wire bytes
#[derive(Debug, Clone)]
pub struct MessageFramer {
    user_agent: Option<String>,
}

impl MessageFramer {
    /// Create a framer for the given connection settings
    pub fn new(settings: &ConnectionSettings) -> Self {
        MessageFramer {
            user_agent: settings
                .include_user_agent
                .then(|| settings.user_agent.clone()),
        }
    }

    /// A framer that only injects Content-Length
    pub fn content_length_only() -> Self {
        MessageFramer { user_agent: None }
    }

    /// Produce the exact bytes to write for `message`
    pub fn frame(&self, message: &str) -> Result<Vec<u8>> {
        let header_end = message.find(DELIM).ok_or(Error::MissingDelimiter)?;
        let body_len = message.len() - header_end - DELIM.len();

        let block = HeaderBlock::parse(&message[..header_end]);
        let mut inserted = Vec::new();
        if !block.contains("Content-Length") {
            inserted.push(format!("Content-Length: {}", body_len));
        }
        if let Some(agent) = &self.user_agent {
            if !block.contains("User-Agent") {
                inserted.push(format!("User-Agent: {}", agent));
            }
        }

        let mut wire = String::with_capacity(message.len() + 64);
        wire.push_str(&message[..header_end]);
        for line in &inserted {
            wire.push_str(CRLF);
            wire.push_str(line);
        }
        wire.push_str(&message[header_end..]);

        Ok(wire.into_bytes())
    }
}

/// Method token of a raw request (text before the first space)
pub fn request_method(message: &str) -> &str {
    message.split(' ').next().unwrap_or("")
}
