//! Header block scanning
//!
//! A lenient, borrowed view over the header section of a raw HTTP message.
//! Nothing here rejects input: lines without a colon are skipped so that
//! malformed traffic can still be inspected.

use super::{CRLF, DELIM};

/// Parsed view of a header block
///
/// Headers are kept in wire order and support:
/// - Case-insensitive header name lookups
/// - Multiple values for the same header name
#[derive(Debug, Clone)]
pub struct HeaderBlock<'a> {
    start_line: &'a str,
    headers: Vec<(&'a str, &'a str)>,
}

impl<'a> HeaderBlock<'a> {
    /// Parse the header section of `text`
    ///
    /// Stops at the first delimiter if there is one, otherwise uses the
    /// whole input.
    pub fn parse(text: &'a str) -> Self {
        let head = match text.find(DELIM) {
            Some(end) => &text[..end],
            None => text,
        };

        let mut lines = head.split(CRLF);
        let start_line = lines.next().unwrap_or("");
        let headers = lines.filter_map(parse_header_line).collect();

        HeaderBlock {
            start_line,
            headers,
        }
    }

    /// The request or status line
    pub fn start_line(&self) -> &'a str {
        self.start_line
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&'a str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
            .collect()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all headers in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.headers.iter().copied()
    }

    /// First Content-Length value, if present and numeric
    pub fn content_length(&self) -> Option<usize> {
        self.get("Content-Length")?.parse().ok()
    }

    /// Whether any Transfer-Encoding header names chunked
    pub fn is_chunked(&self) -> bool {
        self.get_all("Transfer-Encoding")
            .iter()
            .any(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Status code from a status line such as `HTTP/1.1 204 No Content`
    pub fn status_code(&self) -> Option<u16> {
        parse_status_code(self.start_line)
    }

    /// Method from a request line such as `GET / HTTP/1.1`
    pub fn method(&self) -> Option<&'a str> {
        let method = self.start_line.split(' ').next()?;
        (!method.is_empty()).then_some(method)
    }
}

/// Parse a header line into name and value
///
/// Returns `None` for lines without a colon or with an empty name.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let colon_pos = line.find(':')?;
    let name = line[..colon_pos].trim();
    let value = line[colon_pos + 1..].trim();

    if name.is_empty() {
        return None;
    }

    Some((name, value))
}

/// Parse the status code out of a status line
///
/// Format: VERSION STATUS [REASON]
pub fn parse_status_code(line: &str) -> Option<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }

    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}
