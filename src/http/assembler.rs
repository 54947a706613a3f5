//! Response assembly
//!
//! Reads from a connected session until a complete response is buffered.
//! Completeness is judged on raw byte counts; the decoded text is built
//! alongside. A peer that closes early yields whatever arrived, without
//! error.

use super::decode::{DecodePolicy, TextDecoder};
use super::session::SocketSession;
use super::{HeaderBlock, Result, DELIM};
use log::trace;

/// Bytes requested per read
pub const READ_CHUNK_SIZE: usize = 1 << 20;

/// Body budget when the header declares no usable length
pub const FALLBACK_CONTENT_LENGTH: usize = 1 << 20;

/// Status codes that never carry a body
const BODYLESS_STATUS: &[u16] = &[204, 304];

/// Reads one response off a session
pub struct ResponseAssembler<'a> {
    session: &'a mut SocketSession,
    decoder: TextDecoder,
    raw: Vec<u8>,
    text: String,
    buf: Vec<u8>,
}

impl<'a> ResponseAssembler<'a> {
    /// Create an assembler over a connected session
    pub fn new(session: &'a mut SocketSession, policy: DecodePolicy) -> Self {
        ResponseAssembler {
            session,
            decoder: TextDecoder::new(policy),
            raw: Vec::new(),
            text: String::new(),
            buf: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read the response to a request sent with `method`
    pub fn read_response(mut self, method: &str) -> Result<String> {
        let header_end = loop {
            if let Some(pos) = find_delim(&self.raw) {
                break pos + DELIM.len();
            }
            if !self.read_chunk()? {
                return self.finish();
            }
        };

        let (chunked, expected) = {
            let block = HeaderBlock::parse(&self.text);
            let bodyless = block
                .status_code()
                .map_or(false, |code| BODYLESS_STATUS.contains(&code))
                || method.eq_ignore_ascii_case("HEAD");
            let expected = if bodyless {
                0
            } else {
                block.content_length().unwrap_or(FALLBACK_CONTENT_LENGTH)
            };
            (block.is_chunked(), expected)
        };

        if chunked {
            trace!("Chunked response, reading until terminating delimiter");
            while !self.raw.ends_with(DELIM.as_bytes()) {
                if !self.read_chunk()? {
                    break;
                }
            }
        } else {
            trace!("Expecting {} body bytes", expected);
            let target = header_end.saturating_add(expected);
            while self.raw.len() < target {
                if !self.read_chunk()? {
                    break;
                }
            }
        }

        self.finish()
    }

    /// One read; false once the peer has closed
    fn read_chunk(&mut self) -> Result<bool> {
        let n = self.session.read(&mut self.buf)?;
        if n == 0 {
            return Ok(false);
        }

        self.raw.extend_from_slice(&self.buf[..n]);
        self.decoder.decode(&self.buf[..n], &mut self.text)?;
        Ok(true)
    }

    fn finish(mut self) -> Result<String> {
        self.decoder.finish(&mut self.text)?;
        Ok(self.text)
    }
}

fn find_delim(raw: &[u8]) -> Option<usize> {
    raw.windows(DELIM.len()).position(|w| w == DELIM.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Serve `chunks` with a pause between each, then hold or close
    fn serve(chunks: Vec<Vec<u8>>, hold: bool) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for chunk in chunks {
                stream.write_all(&chunk).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(20));
            }
            if hold {
                thread::sleep(Duration::from_secs(3));
            }
        });

        port
    }

    fn assemble(port: u16, method: &str, policy: DecodePolicy) -> Result<String> {
        let mut session = SocketSession::new(ConnectionSettings::new("127.0.0.1", port)).unwrap();
        session.set_timeout(Some(Duration::from_secs(1)));
        session.ensure_connected().unwrap();
        ResponseAssembler::new(&mut session, policy).read_response(method)
    }

    #[test]
    fn test_no_content_needs_no_body_read() {
        // Server keeps the socket open; a second read would time out
        let port = serve(vec![b"HTTP/1.1 204 No Content\r\n\r\n".to_vec()], true);
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert_eq!(text, "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn test_head_ignores_content_length() {
        let port = serve(
            vec![b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n".to_vec()],
            true,
        );
        let text = assemble(port, "HEAD", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("Content-Length: 500\r\n\r\n"));
    }

    #[test]
    fn test_bodyless_status_ignores_content_length() {
        // The peer holds the socket open; reading a body would time out
        for head in [
            "HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n",
            "HTTP/1.1 204 No Content\r\nContent-Length: 10\r\n\r\n",
        ] {
            let port = serve(vec![head.as_bytes().to_vec()], true);
            let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
            assert_eq!(text, head);
        }
    }

    #[test]
    fn test_content_length_across_reads() {
        let port = serve(
            vec![
                b"HTTP/1.1 200 OK\r\nContent-Le".to_vec(),
                b"ngth: 10\r\n\r\n01234".to_vec(),
                b"56789".to_vec(),
            ],
            true,
        );
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("\r\n\r\n0123456789"));
    }

    #[test]
    fn test_chunked_in_single_read() {
        let response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n";
        let port = serve(vec![response.to_vec()], true);
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[test]
    fn test_chunked_across_reads() {
        let port = serve(
            vec![
                b"HTTP/1.1 200 OK\r\ntransfer-encoding: Chunked\r\n\r\n".to_vec(),
                b"3\r\nabc\r\n".to_vec(),
                b"0\r\n\r\n".to_vec(),
            ],
            true,
        );
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("3\r\nabc\r\n0\r\n\r\n"));
    }

    #[test]
    fn test_peer_close_returns_partial() {
        let port = serve(
            vec![b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort".to_vec()],
            false,
        );
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("short"));
    }

    #[test]
    fn test_close_before_delimiter() {
        let port = serve(vec![b"HTTP/1.1 200".to_vec()], false);
        assert_eq!(assemble(port, "GET", DecodePolicy::Strict).unwrap(), "HTTP/1.1 200");

        let port = serve(vec![], false);
        assert_eq!(assemble(port, "GET", DecodePolicy::Strict).unwrap(), "");
    }

    #[test]
    fn test_missing_length_reads_until_close() {
        let port = serve(
            vec![b"HTTP/1.1 200 OK\r\n\r\nfirst ".to_vec(), b"second".to_vec()],
            false,
        );
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("first second"));
    }

    #[test]
    fn test_length_counts_raw_bytes() {
        // 4 bytes on the wire, 2 chars once decoded
        let port = serve(
            vec![
                b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n\xc3".to_vec(),
                b"\xa9\xc3\xa9".to_vec(),
            ],
            true,
        );
        let text = assemble(port, "GET", DecodePolicy::Strict).unwrap();
        assert!(text.ends_with("éé"));
    }

    #[test]
    fn test_decode_policy_applies() {
        let body = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\na\xffb".to_vec();

        let port = serve(vec![body.clone()], true);
        let err = assemble(port, "GET", DecodePolicy::Strict).unwrap_err();
        assert!(matches!(err, crate::http::Error::Decode(_)));

        let port = serve(vec![body], true);
        let text = assemble(port, "GET", DecodePolicy::Ignore).unwrap();
        assert!(text.ends_with("\r\n\r\nab"));
    }

    #[test]
    fn test_silent_peer_times_out() {
        let port = serve(vec![], true);
        let err = assemble(port, "GET", DecodePolicy::Strict).unwrap_err();
        assert!(matches!(err, crate::http::Error::Timeout(_)));
    }

    #[test]
    fn test_find_delim() {
        assert_eq!(find_delim(b"ab\r\n\r\ncd"), Some(2));
        assert_eq!(find_delim(b"ab\r\n"), None);
    }
}
