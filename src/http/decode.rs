//! Incremental response decoding
//!
//! Socket reads split the byte stream at arbitrary points, so a multi-byte
//! UTF-8 sequence cut at the end of one read is held back and completed by
//! the next. Only sequences that are invalid on their own, or still
//! incomplete at end of stream, go through the decode policy.

use super::{Error, Result};
use serde::Deserialize;

/// What to do with bytes that are not valid UTF-8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    /// Fail with `Error::Decode`
    #[default]
    Strict,
    /// Drop the offending bytes
    Ignore,
    /// Substitute U+FFFD for the offending bytes
    Replace,
}

/// Stateful UTF-8 decoder
#[derive(Debug)]
pub struct TextDecoder {
    policy: DecodePolicy,
    pending: Vec<u8>,
    offset: usize,
}

impl TextDecoder {
    /// Create a decoder with the given policy
    pub fn new(policy: DecodePolicy) -> Self {
        TextDecoder {
            policy,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Policy in effect
    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Decode the next slice of the stream, appending to `out`
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        self.drain(out, false)
    }

    /// Flush anything held back; call once at end of stream
    pub fn finish(&mut self, out: &mut String) -> Result<()> {
        self.drain(out, true)
    }

    fn drain(&mut self, out: &mut String, eof: bool) -> Result<()> {
        let input = std::mem::take(&mut self.pending);
        let mut rest = input.as_slice();

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    self.offset += rest.len();
                    return Ok(());
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    self.offset += valid;

                    let bad_len = match e.error_len() {
                        Some(len) => len,
                        None if !eof => {
                            // Truncated sequence; wait for the next read
                            self.pending = rest[valid..].to_vec();
                            return Ok(());
                        }
                        None => rest.len() - valid,
                    };

                    match self.policy {
                        DecodePolicy::Strict => {
                            return Err(Error::Decode(format!(
                                "invalid utf-8 sequence of {} bytes at offset {}",
                                bad_len, self.offset
                            )));
                        }
                        DecodePolicy::Ignore => {
                            log::warn!(
                                "Failed to decode {} bytes at offset {}, ignoring offending bytes",
                                bad_len,
                                self.offset
                            );
                        }
                        DecodePolicy::Replace => out.push(char::REPLACEMENT_CHARACTER),
                    }

                    self.offset += bad_len;
                    rest = &rest[valid + bad_len..];
                }
            }
        }
    }
}
