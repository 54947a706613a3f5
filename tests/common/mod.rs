//! Shared helpers for integration tests
//!
//! Scripted loopback servers, a self-signed TLS acceptor and a minimal
//! HTTP/2 peer.

#![allow(dead_code)]

use hpack::{Decoder, Encoder};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::ssl::{AlpnError, SslAcceptor, SslMethod, SslVerifyMode};
use openssl::x509::{X509NameBuilder, X509};
use rawhttp::config::TransportConfig;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bind a loopback listener on an ephemeral port
pub fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port with nothing listening on it
pub fn closed_port() -> u16 {
    bind().1
}

/// Plain HTTP/1.1 config for a loopback target
pub fn config(port: u16) -> TransportConfig {
    TransportConfig {
        target_port: Some(port),
        ..TransportConfig::default()
    }
}

/// Accept `connections` connections in turn, handing each to `handler`
/// with its index; the join handle yields whatever the handler returned
pub fn serve<F, T>(listener: TcpListener, connections: usize, handler: F) -> JoinHandle<Vec<T>>
where
    F: Fn(usize, TcpStream) -> T + Send + 'static,
    T: Send + 'static,
{
    thread::spawn(move || {
        (0..connections)
            .map(|i| {
                let (stream, _) = listener.accept().unwrap();
                handler(i, stream)
            })
            .collect()
    })
}

/// Read one request: header block plus Content-Length body bytes
///
/// Returns what was read so far if the peer closes first.
pub fn read_request<S: Read>(stream: &mut S) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).into_owned();
            let body_len = head
                .split("\r\n")
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + body_len {
                break;
            }
        }

        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Abort the connection so the peer sees ECONNRESET
pub fn reset(stream: TcpStream) {
    socket2::SockRef::from(&stream)
        .set_linger(Some(Duration::ZERO))
        .unwrap();
    drop(stream);
}

/// Self-signed certificate for `localhost` and its key
pub fn self_signed() -> (X509, PKey<Private>) {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    (builder.build(), key)
}

/// TLS acceptor with a fresh self-signed certificate
///
/// With `h2` set, ALPN selects "h2" when offered. Client certificates are
/// requested and accepted without verification.
pub fn tls_acceptor(h2: bool) -> SslAcceptor {
    let (cert, key) = self_signed();

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.set_verify_callback(SslVerifyMode::PEER, |_, _| true);

    if h2 {
        builder.set_alpn_select_callback(|_ssl, client_protos| {
            openssl::ssl::select_next_proto(b"\x02h2", client_protos).ok_or(AlpnError::NOACK)
        });
    }

    builder.build()
}

/// Frame types used by the test peer
pub mod frame {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;

    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
}

/// One request as seen by the HTTP/2 test peer
#[derive(Debug, Default)]
pub struct H2Seen {
    pub stream_id: u32,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl H2Seen {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Server side of an HTTP/2 connection, just enough to answer requests
pub struct H2Peer<S: Read + Write> {
    stream: S,
    encoder: Encoder<'static>,
    decoder: Decoder<'static>,
}

impl<S: Read + Write> H2Peer<S> {
    /// Read the client preface and its SETTINGS, send ours and ACK theirs
    pub fn accept(mut stream: S) -> Self {
        let mut preface = [0u8; 24];
        stream.read_exact(&mut preface).unwrap();
        assert_eq!(&preface, b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n");

        let mut peer = H2Peer {
            stream,
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        };

        let (kind, flags, _, payload) = peer.read_frame();
        assert_eq!(kind, frame::SETTINGS);
        assert_eq!(flags & frame::ACK, 0);
        // Push must be disabled
        assert!(payload.chunks(6).any(|c| c == [0, 2, 0, 0, 0, 0]));

        peer.write_frame(frame::SETTINGS, 0, 0, &[]);
        peer.write_frame(frame::SETTINGS, frame::ACK, 0, &[]);
        peer
    }

    pub fn read_frame(&mut self) -> (u8, u8, u32, Vec<u8>) {
        let mut header = [0u8; 9];
        self.stream.read_exact(&mut header).unwrap();
        let len = ((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize;
        let stream_id = u32::from_be_bytes([header[5] & 0x7F, header[6], header[7], header[8]]);
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).unwrap();
        (header[3], header[4], stream_id, payload)
    }

    pub fn write_frame(&mut self, kind: u8, flags: u8, stream_id: u32, payload: &[u8]) {
        let len = payload.len();
        let mut buf = vec![(len >> 16) as u8, (len >> 8) as u8, len as u8, kind, flags];
        buf.extend_from_slice(&stream_id.to_be_bytes());
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).unwrap();
        self.stream.flush().unwrap();
    }

    /// Read frames until a complete request arrives; control frames are
    /// skipped
    pub fn read_request(&mut self) -> H2Seen {
        let mut seen = H2Seen::default();

        loop {
            let (kind, flags, stream_id, payload) = self.read_frame();
            match kind {
                frame::HEADERS => {
                    assert_ne!(flags & frame::END_HEADERS, 0);
                    seen.stream_id = stream_id;
                    seen.headers = self
                        .decoder
                        .decode(&payload)
                        .unwrap()
                        .into_iter()
                        .map(|(n, v)| {
                            (
                                String::from_utf8(n).unwrap(),
                                String::from_utf8(v).unwrap(),
                            )
                        })
                        .collect();
                    if flags & frame::END_STREAM != 0 {
                        return seen;
                    }
                }
                frame::DATA => {
                    seen.body.extend_from_slice(&payload);
                    if flags & frame::END_STREAM != 0 {
                        return seen;
                    }
                }
                _ => {}
            }
        }
    }

    /// Send a HEADERS frame with `:status` and `headers`
    pub fn send_headers(&mut self, stream_id: u32, status: &str, headers: &[(&str, &str)], end_stream: bool) {
        let mut fields: Vec<(&[u8], &[u8])> = vec![(&b":status"[..], status.as_bytes())];
        fields.extend(headers.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        let block = self.encoder.encode(fields);

        let flags = frame::END_HEADERS | if end_stream { frame::END_STREAM } else { 0 };
        self.write_frame(frame::HEADERS, flags, stream_id, &block);
    }

    /// Send a full response, the body split over two DATA frames
    pub fn respond(&mut self, stream_id: u32, status: &str, headers: &[(&str, &str)], body: &[u8]) {
        if body.is_empty() {
            self.send_headers(stream_id, status, headers, true);
            return;
        }

        self.send_headers(stream_id, status, headers, false);
        let (first, second) = body.split_at(body.len() / 2);
        self.write_frame(frame::DATA, 0, stream_id, first);
        self.write_frame(frame::DATA, frame::END_STREAM, stream_id, second);
    }

    /// Next frame that is not SETTINGS ACK or WINDOW_UPDATE
    pub fn next_significant_frame(&mut self) -> (u8, u8, u32, Vec<u8>) {
        loop {
            let f = self.read_frame();
            match f.0 {
                frame::WINDOW_UPDATE => continue,
                frame::SETTINGS if f.1 & frame::ACK != 0 => continue,
                _ => return f,
            }
        }
    }

    /// Keep the connection open until the client closes it
    pub fn drain(&mut self) {
        let mut buf = [0u8; 1024];
        while let Ok(n) = self.stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }
}
