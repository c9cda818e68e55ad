//! ZMTP 3.0 wire codec (NULL security mechanism).
//!
//! Every connection starts with a fixed 64-byte greeting in each direction,
//! followed by a `READY` command carrying socket metadata. After that the
//! stream is a sequence of frames. A message is one or more frames where
//! every frame but the last carries the MORE flag.
//!
//! # Greeting Format
//!
//! ```text
//! +------+----------+------+-------+-------+----------------+--------+--------+
//! | 0xFF | 8 x 0x00 | 0x7F | major | minor | mechanism (20) | server | filler |
//! +------+----------+------+-------+-------+----------------+--------+--------+
//!    1        8        1       1       1           20            1       31
//! ```
//!
//! # Frame Format
//!
//! ```text
//! short: | flags | size (1)          | body... |
//! long:  | flags | size (8, BE u64)  | body... |
//!
//! flags: bit 0 MORE, bit 1 LONG, bit 2 COMMAND, bits 3-7 reserved (zero)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::Envelope;
use crate::error::{Error, Result};

/// Size of the greeting exchanged by both sides.
pub const GREETING_SIZE: usize = 64;

/// Protocol version sent in the greeting.
pub const VERSION_MAJOR: u8 = 3;
pub const VERSION_MINOR: u8 = 0;

/// The only security mechanism spoken by this crate.
pub const MECHANISM_NULL: &str = "NULL";

/// Largest frame body encoded with a 1-byte size.
pub const MAX_SHORT_SIZE: usize = u8::MAX as usize;

/// Longest possible frame header (flags + 8-byte size).
pub const MAX_HEADER_SIZE: usize = 9;

const SIGNATURE_HEAD: u8 = 0xFF;
const SIGNATURE_TAIL: u8 = 0x7F;
const MECHANISM_LEN: usize = 20;

/// Frame flag bits.
pub mod flags {
    pub const MORE: u8 = 0x01;
    pub const LONG: u8 = 0x02;
    pub const COMMAND: u8 = 0x04;
    pub const RESERVED: u8 = !(MORE | LONG | COMMAND);
}

/// Socket type names exchanged in `READY` metadata.
pub mod socket_type {
    pub const DEALER: &str = "DEALER";
    pub const ROUTER: &str = "ROUTER";
    pub const REP: &str = "REP";

    /// Peers a DEALER socket may talk to.
    pub fn is_dealer_peer(name: &str) -> bool {
        [ROUTER, DEALER, REP]
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
    }
}

/// Metadata property names.
pub const PROP_SOCKET_TYPE: &str = "Socket-Type";
pub const PROP_IDENTITY: &str = "Identity";

/// Connection greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub major: u8,
    pub minor: u8,
    pub mechanism: String,
    pub as_server: bool,
}

impl Greeting {
    /// Greeting sent by a connecting NULL-mechanism client.
    pub fn null() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            mechanism: MECHANISM_NULL.to_string(),
            as_server: false,
        }
    }

    pub fn to_bytes(&self) -> [u8; GREETING_SIZE] {
        let mut buf = [0u8; GREETING_SIZE];
        buf[0] = SIGNATURE_HEAD;
        buf[9] = SIGNATURE_TAIL;
        buf[10] = self.major;
        buf[11] = self.minor;
        let mechanism = self.mechanism.as_bytes();
        let n = mechanism.len().min(MECHANISM_LEN);
        buf[12..12 + n].copy_from_slice(&mechanism[..n]);
        buf[32] = self.as_server as u8;
        buf
    }

    /// Parses and validates a peer greeting.
    pub fn from_bytes(buf: &[u8; GREETING_SIZE]) -> Result<Self> {
        if buf[0] != SIGNATURE_HEAD || buf[9] != SIGNATURE_TAIL {
            return Err(Error::Handshake("invalid ZMTP signature".into()));
        }
        let major = buf[10];
        if major < VERSION_MAJOR {
            return Err(Error::Handshake(format!(
                "unsupported ZMTP version {}.{}",
                major, buf[11]
            )));
        }
        let raw = &buf[12..12 + MECHANISM_LEN];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(MECHANISM_LEN);
        let mechanism = String::from_utf8_lossy(&raw[..end]).into_owned();
        if mechanism != MECHANISM_NULL {
            return Err(Error::Handshake(format!(
                "unsupported security mechanism {mechanism:?}"
            )));
        }
        Ok(Self {
            major,
            minor: buf[11],
            mechanism,
            as_server: buf[32] != 0,
        })
    }
}

/// Ordered metadata properties of a `READY` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    properties: Vec<(String, Bytes)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Bytes>) {
        self.properties.push((name.to_string(), value.into()));
    }

    /// Looks up a property. Names are case-insensitive.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.properties
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn encode(&self, buf: &mut BytesMut) {
        for (name, value) in &self.properties {
            buf.put_u8(name.len() as u8);
            buf.put_slice(name.as_bytes());
            buf.put_u32(value.len() as u32);
            buf.put_slice(value);
        }
    }

    fn decode(mut data: &[u8]) -> Result<Self> {
        let mut metadata = Self::new();
        while data.has_remaining() {
            let name_len = data.get_u8() as usize;
            if data.remaining() < name_len + 4 {
                return Err(Error::protocol("truncated metadata property name"));
            }
            let name = String::from_utf8_lossy(&data[..name_len]).into_owned();
            data.advance(name_len);
            let value_len = data.get_u32() as usize;
            if data.remaining() < value_len {
                return Err(Error::protocol("truncated metadata property value"));
            }
            metadata.insert(&name, Bytes::copy_from_slice(&data[..value_len]));
            data.advance(value_len);
        }
        Ok(metadata)
    }
}

/// ZMTP commands understood by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ready(Metadata),
    Error(String),
    Ping { ttl: u16, context: Bytes },
    Pong { context: Bytes },
    Unknown { name: String, data: Bytes },
}

impl Command {
    pub fn name(&self) -> &str {
        match self {
            Command::Ready(_) => "READY",
            Command::Error(_) => "ERROR",
            Command::Ping { .. } => "PING",
            Command::Pong { .. } => "PONG",
            Command::Unknown { name, .. } => name,
        }
    }

    /// Encodes the command body (name + data), without the frame header.
    pub fn to_body(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        let name = self.name();
        buf.put_u8(name.len() as u8);
        buf.put_slice(name.as_bytes());
        match self {
            Command::Ready(metadata) => metadata.encode(&mut buf),
            Command::Error(reason) => {
                let reason = &reason.as_bytes()[..reason.len().min(u8::MAX as usize)];
                buf.put_u8(reason.len() as u8);
                buf.put_slice(reason);
            }
            Command::Ping { ttl, context } => {
                buf.put_u16(*ttl);
                buf.put_slice(context);
            }
            Command::Pong { context } => buf.put_slice(context),
            Command::Unknown { data, .. } => buf.put_slice(data),
        }
        buf
    }

    pub fn from_body(body: &[u8]) -> Result<Self> {
        let Some((&name_len, rest)) = body.split_first() else {
            return Err(Error::protocol("empty command frame"));
        };
        let name_len = name_len as usize;
        if rest.len() < name_len {
            return Err(Error::protocol("truncated command name"));
        }
        let (name, mut data) = rest.split_at(name_len);
        let command = match name {
            b"READY" => Command::Ready(Metadata::decode(data)?),
            b"ERROR" => {
                let reason = match data.split_first() {
                    Some((&len, reason)) => &reason[..(len as usize).min(reason.len())],
                    None => b"".as_slice(),
                };
                Command::Error(String::from_utf8_lossy(reason).into_owned())
            }
            b"PING" => {
                if data.remaining() < 2 {
                    return Err(Error::protocol("truncated PING"));
                }
                let ttl = data.get_u16();
                Command::Ping {
                    ttl,
                    context: Bytes::copy_from_slice(data),
                }
            }
            b"PONG" => Command::Pong {
                context: Bytes::copy_from_slice(data),
            },
            _ => Command::Unknown {
                name: String::from_utf8_lossy(name).into_owned(),
                data: Bytes::copy_from_slice(data),
            },
        };
        Ok(command)
    }
}

/// Encodes a frame header for a body of `len` bytes.
///
/// Returns the header buffer and the number of bytes used.
pub fn frame_header(frame_flags: u8, len: usize) -> ([u8; MAX_HEADER_SIZE], usize) {
    let mut header = [0u8; MAX_HEADER_SIZE];
    if len > MAX_SHORT_SIZE {
        header[0] = frame_flags | flags::LONG;
        header[1..9].copy_from_slice(&(len as u64).to_be_bytes());
        (header, 9)
    } else {
        header[0] = frame_flags;
        header[1] = len as u8;
        (header, 2)
    }
}

/// Encodes a command into a complete frame.
pub fn encode_command(command: &Command) -> BytesMut {
    let body = command.to_body();
    let (header, n) = frame_header(flags::COMMAND, body.len());
    let mut buf = BytesMut::with_capacity(n + body.len());
    buf.put_slice(&header[..n]);
    buf.put_slice(&body);
    buf
}

/// Pairs each frame of an envelope with its encoded header, setting MORE on
/// all but the last.
pub fn message_frames(
    envelope: &Envelope,
) -> impl Iterator<Item = (([u8; MAX_HEADER_SIZE], usize), &Bytes)> {
    let frames = envelope.frames();
    frames.iter().enumerate().map(move |(i, frame)| {
        let more = if i + 1 < frames.len() { flags::MORE } else { 0 };
        (frame_header(more, frame.len()), frame)
    })
}

/// Encodes all frames of an envelope into one buffer.
pub fn encode_message(envelope: &Envelope) -> BytesMut {
    let mut buf =
        BytesMut::with_capacity(envelope.total_size() + envelope.len() * MAX_HEADER_SIZE);
    for ((header, n), frame) in message_frames(envelope) {
        buf.put_slice(&header[..n]);
        buf.put_slice(frame);
    }
    buf
}

/// A complete unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(Vec<Bytes>),
    Command(Command),
}

/// Incremental decoder over bytes read from a stream.
///
/// Bytes are appended with [`extend`](FrameDecoder::extend) as they arrive;
/// partial input stays buffered until the rest shows up, so reads can be
/// abandoned at any point without losing data.
pub struct FrameDecoder {
    buffer: BytesMut,
    pending: Vec<Bytes>,
    max_frame_size: u64,
}

impl FrameDecoder {
    pub fn new(max_frame_size: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            pending: Vec::new(),
            max_frame_size: max_frame_size.min(usize::MAX as u64),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the peer greeting once 64 bytes are buffered.
    pub fn decode_greeting(&mut self) -> Result<Option<Greeting>> {
        if self.buffer.len() < GREETING_SIZE {
            return Ok(None);
        }
        let mut raw = [0u8; GREETING_SIZE];
        raw.copy_from_slice(&self.buffer[..GREETING_SIZE]);
        self.buffer.advance(GREETING_SIZE);
        Greeting::from_bytes(&raw).map(Some)
    }

    /// Decodes the next complete message or command, if fully buffered.
    pub fn decode(&mut self) -> Result<Option<Inbound>> {
        while let Some((frame_flags, body)) = self.decode_frame()? {
            if frame_flags & flags::COMMAND != 0 {
                if !self.pending.is_empty() {
                    return Err(Error::protocol("command interleaved with message frames"));
                }
                return Command::from_body(&body).map(|c| Some(Inbound::Command(c)));
            }
            self.pending.push(body);
            if frame_flags & flags::MORE == 0 {
                return Ok(Some(Inbound::Message(std::mem::take(&mut self.pending))));
            }
        }
        Ok(None)
    }

    fn decode_frame(&mut self) -> Result<Option<(u8, Bytes)>> {
        let Some(&frame_flags) = self.buffer.first() else {
            return Ok(None);
        };
        if frame_flags & flags::RESERVED != 0 {
            return Err(Error::protocol(format!(
                "reserved flag bits set: {frame_flags:#04x}"
            )));
        }
        if frame_flags & flags::COMMAND != 0 && frame_flags & flags::MORE != 0 {
            return Err(Error::protocol("command frame with MORE flag"));
        }

        let (header_len, size) = if frame_flags & flags::LONG != 0 {
            if self.buffer.len() < 9 {
                return Ok(None);
            }
            let mut size = [0u8; 8];
            size.copy_from_slice(&self.buffer[1..9]);
            (9, u64::from_be_bytes(size))
        } else {
            if self.buffer.len() < 2 {
                return Ok(None);
            }
            (2, self.buffer[1] as u64)
        };

        if size > self.max_frame_size {
            return Err(Error::protocol(format!(
                "frame of {} bytes exceeds limit of {}",
                size, self.max_frame_size
            )));
        }
        let available = (self.buffer.len() - header_len) as u64;
        if size > available {
            return Ok(None);
        }
        let size = size as usize;

        self.buffer.advance(header_len);
        let body = self.buffer.split_to(size).freeze();
        log::trace!(
            "Decoded frame flags={:#04x}, len={}",
            frame_flags,
            body.len()
        );
        Ok(Some((frame_flags, body)))
    }
}
