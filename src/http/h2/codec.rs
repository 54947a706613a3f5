//! HTTP/2 frame encoding and decoding
//!
//! Frames are built as byte buffers so a whole request can be handed to the
//! socket in one write.

use crate::http::session::SocketSession;
use crate::http::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// HTTP/2 frame types (RFC 9113 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8; `None` for extension types
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// SETTINGS parameters this client sends or reads
pub mod setting {
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
}

/// One received frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw type byte; unknown types are kept so they can be skipped
    pub kind: u8,
    pub flags: FrameFlags,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Known frame type, if any
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.kind)
    }

    /// Application data of a DATA frame or header fragment of a HEADERS
    /// frame, with padding and priority fields removed
    pub fn fragment(&self) -> Result<Bytes> {
        let mut payload = self.payload.clone();

        let pad_len = if self.flags.is_padded() {
            if payload.is_empty() {
                return Err(protocol("padded frame without pad length"));
            }
            payload.get_u8() as usize
        } else {
            0
        };

        if self.frame_type() == Some(FrameType::Headers) && self.flags.is_priority() {
            if payload.len() < 5 {
                return Err(protocol("HEADERS priority field truncated"));
            }
            payload.advance(5);
        }

        if pad_len > payload.len() {
            return Err(protocol("padding exceeds frame payload"));
        }
        payload.truncate(payload.len() - pad_len);

        Ok(payload)
    }

    /// Error code carried by RST_STREAM or GOAWAY
    pub fn error_code(&self) -> Option<u32> {
        let offset = match self.frame_type()? {
            FrameType::RstStream => 0,
            FrameType::Goaway => 4,
            _ => return None,
        };
        let bytes = self.payload.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn protocol(msg: &str) -> Error {
    Error::Protocol(msg.to_string())
}

/// Frame codec for encoding/decoding HTTP/2 frames
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame header into a buffer
    pub fn encode_header(
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        length: usize,
    ) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        header[3] = frame_type.as_u8();
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        let stream_id = stream_id & 0x7FFF_FFFF;
        header[5..9].copy_from_slice(&stream_id.to_be_bytes());

        header
    }

    /// Decode a frame header: raw type, flags, stream ID and payload length
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> (u8, FrameFlags, u32, usize) {
        let length = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        // Ignore reserved bit
        let stream_id = u32::from_be_bytes([bytes[5] & 0x7F, bytes[6], bytes[7], bytes[8]]);

        (bytes[3], FrameFlags::from_u8(bytes[4]), stream_id, length)
    }

    /// Append one frame to `buf`
    pub fn put_frame(
        buf: &mut BytesMut,
        frame_type: FrameType,
        flags: FrameFlags,
        stream_id: u32,
        payload: &[u8],
    ) {
        buf.put_slice(&Self::encode_header(frame_type, flags, stream_id, payload.len()));
        buf.put_slice(payload);
    }

    /// Append a HEADERS frame, split into CONTINUATION frames when the
    /// block exceeds `max_frame_size`
    pub fn put_headers(
        buf: &mut BytesMut,
        stream_id: u32,
        block: &[u8],
        end_stream: bool,
        max_frame_size: usize,
    ) {
        let max = max_frame_size.max(1);
        let mut chunks = block.chunks(max).peekable();
        let mut first = true;

        // An empty block still needs one HEADERS frame
        if chunks.peek().is_none() {
            let mut flags = FrameFlags::from_u8(FrameFlags::END_HEADERS);
            if end_stream {
                flags.set(FrameFlags::END_STREAM);
            }
            Self::put_frame(buf, FrameType::Headers, flags, stream_id, &[]);
            return;
        }

        while let Some(chunk) = chunks.next() {
            let mut flags = FrameFlags::empty();
            if chunks.peek().is_none() {
                flags.set(FrameFlags::END_HEADERS);
            }
            let frame_type = if first {
                if end_stream {
                    flags.set(FrameFlags::END_STREAM);
                }
                FrameType::Headers
            } else {
                FrameType::Continuation
            };
            Self::put_frame(buf, frame_type, flags, stream_id, chunk);
            first = false;
        }
    }

    /// Append DATA frames carrying `data`, the last one ending the stream
    pub fn put_data(buf: &mut BytesMut, stream_id: u32, data: &[u8], max_frame_size: usize) {
        let max = max_frame_size.max(1);
        let mut chunks = data.chunks(max).peekable();

        while let Some(chunk) = chunks.next() {
            let mut flags = FrameFlags::empty();
            if chunks.peek().is_none() {
                flags.set(FrameFlags::END_STREAM);
            }
            Self::put_frame(buf, FrameType::Data, flags, stream_id, chunk);
        }
    }

    /// Append a SETTINGS frame
    pub fn put_settings(buf: &mut BytesMut, settings: &[(u16, u32)]) {
        let mut payload = BytesMut::with_capacity(settings.len() * 6);
        for (id, value) in settings {
            payload.put_u16(*id);
            payload.put_u32(*value);
        }
        Self::put_frame(buf, FrameType::Settings, FrameFlags::empty(), 0, &payload);
    }

    /// Append a SETTINGS ACK
    pub fn put_settings_ack(buf: &mut BytesMut) {
        Self::put_frame(
            buf,
            FrameType::Settings,
            FrameFlags::from_u8(FrameFlags::ACK),
            0,
            &[],
        );
    }

    /// Append a PING ACK echoing `data`
    pub fn put_ping_ack(buf: &mut BytesMut, data: &[u8]) {
        Self::put_frame(
            buf,
            FrameType::Ping,
            FrameFlags::from_u8(FrameFlags::ACK),
            0,
            data,
        );
    }

    /// Append a WINDOW_UPDATE frame
    pub fn put_window_update(buf: &mut BytesMut, stream_id: u32, increment: u32) {
        Self::put_frame(
            buf,
            FrameType::WindowUpdate,
            FrameFlags::empty(),
            stream_id,
            &(increment & 0x7FFF_FFFF).to_be_bytes(),
        );
    }

    /// Parse a SETTINGS payload into (identifier, value) pairs
    pub fn parse_settings(payload: &[u8]) -> Result<Vec<(u16, u32)>> {
        if payload.len() % 6 != 0 {
            return Err(protocol("SETTINGS payload not a multiple of 6"));
        }
        Ok(payload
            .chunks_exact(6)
            .map(|c| {
                (
                    u16::from_be_bytes([c[0], c[1]]),
                    u32::from_be_bytes([c[2], c[3], c[4], c[5]]),
                )
            })
            .collect())
    }

    /// Read one frame from the session
    pub fn read_frame(session: &mut SocketSession) -> Result<Frame> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        read_exact(session, &mut header)?;

        let (kind, flags, stream_id, payload_len) = Self::decode_header(&header);

        let mut payload = vec![0u8; payload_len];
        read_exact(session, &mut payload)?;

        Ok(Frame {
            kind,
            flags,
            stream_id,
            payload: Bytes::from(payload),
        })
    }
}

fn read_exact(session: &mut SocketSession, buf: &mut [u8]) -> Result<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = session.read(&mut buf[read..])?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        read += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: FrameType, flags: u8, payload: &[u8]) -> Frame {
        Frame {
            kind: kind.as_u8(),
            flags: FrameFlags::from_u8(flags),
            stream_id: 1,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_encode_decode_header() {
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let header = FrameCodec::encode_header(FrameType::Headers, flags, 42, 1234);
        let (kind, decoded_flags, stream_id, length) = FrameCodec::decode_header(&header);

        assert_eq!(FrameType::from_u8(kind), Some(FrameType::Headers));
        assert_eq!(decoded_flags, flags);
        assert_eq!(stream_id, 42);
        assert_eq!(length, 1234);
    }

    #[test]
    fn test_reserved_bit_ignored() {
        let mut header = FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 7, 0);
        header[5] |= 0x80;
        assert_eq!(FrameCodec::decode_header(&header).2, 7);
    }

    #[test]
    fn test_put_data_splits_and_ends_stream() {
        let mut buf = BytesMut::new();
        FrameCodec::put_data(&mut buf, 3, b"abcde", 2);

        // Three frames: "ab", "cd", "e"
        assert_eq!(buf.len(), 3 * FRAME_HEADER_SIZE + 5);
        assert_eq!(buf[4], 0);
        assert_eq!(buf[FRAME_HEADER_SIZE + 2 + 4], 0);
        let last = 2 * (FRAME_HEADER_SIZE + 2);
        assert_eq!(&buf[last..last + 3], &[0, 0, 1]);
        assert_eq!(buf[last + 4], FrameFlags::END_STREAM);
        assert_eq!(&buf[last + FRAME_HEADER_SIZE..], b"e");
    }

    #[test]
    fn test_put_headers_with_continuation() {
        let mut buf = BytesMut::new();
        FrameCodec::put_headers(&mut buf, 1, b"0123456789", true, 6);

        assert_eq!(buf[3], FrameType::Headers.as_u8());
        assert_eq!(buf[4], FrameFlags::END_STREAM);
        let second = FRAME_HEADER_SIZE + 6;
        assert_eq!(buf[second + 3], FrameType::Continuation.as_u8());
        assert_eq!(buf[second + 4], FrameFlags::END_HEADERS);
        assert_eq!(&buf[second + FRAME_HEADER_SIZE..], b"6789");
    }

    #[test]
    fn test_put_settings() {
        let mut buf = BytesMut::new();
        FrameCodec::put_settings(&mut buf, &[(setting::ENABLE_PUSH, 0)]);
        assert_eq!(&buf[0..3], &[0, 0, 6]);
        assert_eq!(buf[3], FrameType::Settings.as_u8());
        assert_eq!(&buf[5..9], &[0, 0, 0, 0]);
        assert_eq!(&buf[9..], &[0, 2, 0, 0, 0, 0]);

        let parsed = FrameCodec::parse_settings(&buf[9..]).unwrap();
        assert_eq!(parsed, vec![(setting::ENABLE_PUSH, 0)]);
        assert!(FrameCodec::parse_settings(&[0; 5]).is_err());
    }

    #[test]
    fn test_window_update_masks_reserved_bit() {
        let mut buf = BytesMut::new();
        FrameCodec::put_window_update(&mut buf, 0, 0xFFFF_FFFF);
        assert_eq!(&buf[9..], &[0x7F, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_fragment_strips_padding_and_priority() {
        // pad length 2, priority (5 bytes), "hi", 2 bytes padding
        let payload = [2, 0, 0, 0, 0, 16, b'h', b'i', 0, 0];
        let headers = frame(
            FrameType::Headers,
            FrameFlags::PADDED | FrameFlags::PRIORITY,
            &payload,
        );
        assert_eq!(&headers.fragment().unwrap()[..], b"hi");

        let data = frame(FrameType::Data, FrameFlags::PADDED, &[1, b'x', 0]);
        assert_eq!(&data.fragment().unwrap()[..], b"x");

        let bad = frame(FrameType::Data, FrameFlags::PADDED, &[9, b'x']);
        assert!(bad.fragment().is_err());
    }

    #[test]
    fn test_error_code() {
        let rst = frame(FrameType::RstStream, 0, &[0, 0, 0, 8]);
        assert_eq!(rst.error_code(), Some(8));

        let goaway = frame(FrameType::Goaway, 0, &[0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(goaway.error_code(), Some(2));
    }
}
