//! HTTP/2 backend
//!
//! Translates a raw HTTP/1-style message into one HTTP/2 request on a fresh
//! stream and renders the reply back into HTTP/1-shaped text. The
//! connection is set up on first use and dropped after any failure.

use super::codec::{setting, Frame, FrameCodec, FrameType};
use super::{
    CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_MAX_FRAME_SIZE, HOP_BY_HOP_HEADERS,
    MAX_STREAM_ID,
};
use crate::config::ConnectionSettings;
use crate::http::decode::{DecodePolicy, TextDecoder};
use crate::http::session::SocketSession;
use crate::http::sink::{LogSink, WireSink};
use crate::http::transport::Backend;
use crate::http::{Error, FailureKind, HeaderBlock, Response, Result, CRLF, DELIM};
use crate::net::Throttle;
use bytes::BytesMut;
use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// ALPN identifier for HTTP/2 over TLS
pub const ALPN_H2: &str = "h2";

/// A raw message split into the parts HTTP/2 carries separately
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Request {
    pub method: String,
    pub path: String,
    pub authority: String,
    /// Regular headers, names lowercased, hop-by-hop headers removed
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl H2Request {
    /// Split `message`; `default_authority` is used when there is no Host
    pub fn parse(message: &str, default_authority: &str) -> Result<Self> {
        let header_end = message.find(DELIM).ok_or(Error::MissingDelimiter)?;
        let block = HeaderBlock::parse(&message[..header_end]);

        let mut parts = block.start_line().split(' ');
        let method = parts.next().unwrap_or("").to_string();
        let path = match parts.next() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "/".to_string(),
        };

        let authority = block
            .get("Host")
            .filter(|h| !h.is_empty())
            .unwrap_or(default_authority)
            .to_string();

        let headers = block
            .iter()
            .filter(|(name, _)| {
                !HOP_BY_HOP_HEADERS
                    .iter()
                    .any(|h| name.eq_ignore_ascii_case(h))
            })
            .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
            .collect();

        Ok(H2Request {
            method,
            path,
            authority,
            headers,
            body: message[header_end + DELIM.len()..].as_bytes().to_vec(),
        })
    }
}

/// Per-connection protocol state
struct H2Connection {
    encoder: HpackEncoder<'static>,
    decoder: HpackDecoder<'static>,
    next_stream_id: u32,
    max_frame_size: usize,
}

impl H2Connection {
    fn new() -> Self {
        H2Connection {
            encoder: HpackEncoder::new(),
            decoder: HpackDecoder::new(),
            next_stream_id: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE as usize,
        }
    }

    /// Whether the client stream id space is used up
    fn is_exhausted(&self) -> bool {
        self.next_stream_id > MAX_STREAM_ID
    }

    /// Claim the next client stream id
    fn claim_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id = id.saturating_add(2);
        id
    }

    fn apply_settings(&mut self, settings: &[(u16, u32)]) {
        for &(id, value) in settings {
            if id == setting::MAX_FRAME_SIZE {
                self.max_frame_size = value as usize;
            }
        }
    }
}

/// HTTP/2 response as received
#[derive(Debug, Default)]
struct H2Reply {
    status: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// Backend speaking HTTP/2 to the target
///
/// TLS targets negotiate `h2` through ALPN; plain targets are spoken to
/// with prior knowledge.
pub struct H2Backend {
    session: SocketSession,
    throttle: Arc<Throttle>,
    decode_policy: DecodePolicy,
    sink: Arc<dyn WireSink>,
    conn: Option<H2Connection>,
    scheme: &'static str,
}

impl H2Backend {
    /// Create a backend; TLS material is loaded now, the socket on first use
    pub fn new(
        settings: ConnectionSettings,
        throttle: Arc<Throttle>,
        decode_policy: DecodePolicy,
    ) -> Result<Self> {
        let scheme = if settings.use_tls { "https" } else { "http" };
        let session = SocketSession::with_alpn(settings, &[ALPN_H2])?;

        Ok(H2Backend {
            session,
            throttle,
            decode_policy,
            sink: Arc::new(LogSink),
            conn: None,
            scheme,
        })
    }

    /// Whether an HTTP/2 connection is established
    pub fn is_connected(&self) -> bool {
        self.conn.is_some() && self.session.is_connected()
    }

    fn default_authority(&self) -> String {
        let settings = self.session.settings();
        format!("{}:{}", settings.target_host, settings.target_port)
    }

    /// Drop the connection; the next call starts over
    fn reset(&mut self) {
        self.conn = None;
        self.session.close();
    }

    /// Connect, exchange prefaces and SETTINGS
    fn handshake(&mut self) -> Result<H2Connection> {
        self.session.connect()?;

        if self.session.settings().use_tls {
            let alpn = self.session.negotiated_alpn();
            if alpn.as_deref() != Some(ALPN_H2.as_bytes()) {
                return Err(Error::Protocol(format!(
                    "server did not negotiate h2 (ALPN: {:?})",
                    alpn.map(|a| String::from_utf8_lossy(&a).into_owned())
                )));
            }
        }

        let mut buf = BytesMut::new();
        buf.extend_from_slice(CONNECTION_PREFACE);
        FrameCodec::put_settings(&mut buf, &[(setting::ENABLE_PUSH, 0)]);
        self.session.write_all(&buf)?;

        let mut conn = H2Connection::new();
        loop {
            let frame = FrameCodec::read_frame(&mut self.session)?;
            match frame.frame_type() {
                Some(FrameType::Settings) if frame.flags.is_ack() => continue,
                Some(FrameType::Settings) => {
                    conn.apply_settings(&FrameCodec::parse_settings(&frame.payload)?);
                    let mut ack = BytesMut::new();
                    FrameCodec::put_settings_ack(&mut ack);
                    self.session.write_all(&ack)?;
                    debug!("HTTP/2 connection established");
                    return Ok(conn);
                }
                Some(FrameType::Goaway) => return Err(Error::ConnectionClosed),
                other => {
                    return Err(Error::Protocol(format!(
                        "expected SETTINGS, got {}",
                        other.map_or_else(|| format!("type 0x{:x}", frame.kind), |t| t.to_string())
                    )))
                }
            }
        }
    }

    fn exchange(&mut self, request: &H2Request, timeout: Duration) -> Result<String> {
        self.session.set_timeout(Some(timeout));

        let mut conn = match self.conn.take() {
            Some(conn) if self.session.is_connected() => conn,
            _ => self.handshake()?,
        };

        if conn.is_exhausted() {
            debug!("HTTP/2 stream ids exhausted, opening a new connection");
            conn = self.handshake()?;
        }
        let stream_id = conn.claim_stream_id();

        let mut fields: Vec<(&[u8], &[u8])> = vec![
            (&b":method"[..], request.method.as_bytes()),
            (&b":scheme"[..], self.scheme.as_bytes()),
            (&b":authority"[..], request.authority.as_bytes()),
            (&b":path"[..], request.path.as_bytes()),
        ];
        fields.extend(
            request
                .headers
                .iter()
                .map(|(n, v)| (n.as_bytes(), v.as_bytes())),
        );

        let mut block = Vec::new();
        conn.encoder
            .encode_into(fields, &mut block)
            .map_err(Error::Io)?;

        let mut wire = BytesMut::new();
        let has_body = !request.body.is_empty();
        FrameCodec::put_headers(&mut wire, stream_id, &block, !has_body, conn.max_frame_size);
        if has_body {
            FrameCodec::put_data(&mut wire, stream_id, &request.body, conn.max_frame_size);
        }

        self.sink.sent(&wire);
        let session = &mut self.session;
        self.throttle.run(|| session.write_all(&wire))?;

        let reply = self.read_reply(&mut conn, stream_id)?;
        let text = self.render(reply)?;
        self.sink.received(&text);

        self.conn = Some(conn);
        Ok(text)
    }

    fn read_reply(&mut self, conn: &mut H2Connection, stream_id: u32) -> Result<H2Reply> {
        let mut reply = H2Reply::default();
        let mut headers_seen = false;

        loop {
            let frame = FrameCodec::read_frame(&mut self.session)?;
            let ours = frame.stream_id == stream_id;

            match frame.frame_type() {
                Some(FrameType::Headers) => {
                    let block = self.header_block(&frame)?;
                    let fields = conn
                        .decoder
                        .decode(&block)
                        .map_err(|e| Error::Protocol(format!("HPACK decode error: {:?}", e)))?;

                    if ours {
                        for (name, value) in fields {
                            let name = String::from_utf8_lossy(&name).into_owned();
                            let value = String::from_utf8_lossy(&value).into_owned();
                            if name == ":status" {
                                reply.status = value;
                            } else if !name.starts_with(':') {
                                reply.headers.push((name, value));
                            }
                        }
                        headers_seen = true;
                        if frame.flags.is_end_stream() {
                            break;
                        }
                    }
                }
                Some(FrameType::Data) => {
                    // Flow control counts padding too
                    let consumed = frame.payload.len() as u32;
                    if ours {
                        if !headers_seen {
                            return Err(Error::Protocol("DATA before HEADERS".to_string()));
                        }
                        reply.body.extend_from_slice(&frame.fragment()?);
                    }
                    if consumed > 0 {
                        let mut update = BytesMut::new();
                        FrameCodec::put_window_update(&mut update, CONNECTION_STREAM_ID, consumed);
                        if ours && !frame.flags.is_end_stream() {
                            FrameCodec::put_window_update(&mut update, stream_id, consumed);
                        }
                        self.session.write_all(&update)?;
                    }
                    if ours && frame.flags.is_end_stream() {
                        break;
                    }
                }
                Some(FrameType::Settings) if !frame.flags.is_ack() => {
                    conn.apply_settings(&FrameCodec::parse_settings(&frame.payload)?);
                    let mut ack = BytesMut::new();
                    FrameCodec::put_settings_ack(&mut ack);
                    self.session.write_all(&ack)?;
                }
                Some(FrameType::Ping) if !frame.flags.is_ack() => {
                    let mut pong = BytesMut::new();
                    FrameCodec::put_ping_ack(&mut pong, &frame.payload);
                    self.session.write_all(&pong)?;
                }
                Some(FrameType::Goaway) => {
                    debug!("GOAWAY received, error code {:?}", frame.error_code());
                    return Err(Error::ConnectionClosed);
                }
                Some(FrameType::RstStream) if ours => {
                    return Err(Error::Protocol(format!(
                        "stream {} reset with error code {}",
                        stream_id,
                        frame.error_code().unwrap_or_default()
                    )));
                }
                _ => {
                    // Everything else needs no response
                }
            }
        }

        Ok(reply)
    }

    /// Complete header block of a HEADERS frame and its CONTINUATIONs
    fn header_block(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        let mut block = frame.fragment()?.to_vec();
        let mut end = frame.flags.is_end_headers();

        while !end {
            let next = FrameCodec::read_frame(&mut self.session)?;
            if next.frame_type() != Some(FrameType::Continuation) || next.stream_id != frame.stream_id {
                return Err(Error::Protocol("expected CONTINUATION".to_string()));
            }
            block.extend_from_slice(&next.payload);
            end = next.flags.is_end_headers();
        }

        Ok(block)
    }

    fn render(&self, reply: H2Reply) -> Result<String> {
        let mut text = format!("HTTP/2 {}{}", reply.status, CRLF);
        for (name, value) in &reply.headers {
            text.push_str(name);
            text.push_str(": ");
            text.push_str(value);
            text.push_str(CRLF);
        }
        text.push_str(CRLF);

        let mut decoder = TextDecoder::new(self.decode_policy);
        decoder.decode(&reply.body, &mut text)?;
        decoder.finish(&mut text)?;

        Ok(text)
    }
}

impl Backend for H2Backend {
    fn send_recv(&mut self, message: &str, timeout: Duration) -> Result<(bool, Response)> {
        let request = H2Request::parse(message, &self.default_authority())?;

        match self.exchange(&request, timeout) {
            Ok(text) => Ok((true, Response::from_wire(text))),
            Err(e) => {
                self.reset();
                if e.is_fatal() {
                    return Err(e);
                }
                match e.failure_kind() {
                    FailureKind::Timeout => debug!("Reached max request timeout of {:?}", timeout),
                    _ => warn!("HTTP/2 exchange failed: {}", e),
                }
                Ok((false, Response::from_error(&e)))
            }
        }
    }

    fn set_sink(&mut self, sink: Arc<dyn WireSink>) {
        self.sink = sink;
    }
}
