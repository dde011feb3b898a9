//! Control-protocol parsing utility.
//!
//! [CtlOutgoing] is the logic representation of an outgoing control frame.
//! [CtlIncoming] is a read cursor over a received frame's payload.
//! [CtlMessage] is one fully decoded frame, from either side of the channel.
//!
//! Every frame starts with a fixed 8-byte header, all fields big-endian:
//!
//! ```text
//!   0               2               4                               8
//!   +---------------+---------------+-------------------------------+
//!   |      len      |     type      |             token             |
//!   +---------------+---------------+-------------------------------+
//!   |                       payload (len - 8 bytes)                 |
//!   +---------------------------------------------------------------+
//! ```
//!
//! `len` covers the whole frame including the header. `token` correlates a
//! lookup reply with its query and is zero for all other frame types.
//!
//! Strings on the wire are DNS-style character-strings: one length byte
//! followed by up to 255 bytes of UTF-8. An empty character-string encodes
//! an absent optional field (a service name can never be empty).

#[cfg(feature = "logging")]
use crate::log::trace;

use crate::error::{Error, Result};
use std::{fmt, net::Ipv4Addr};

/// Length of the fixed frame header in bytes.
pub const CTL_HEADER_LEN: usize = 8;

/// Max length of a whole control frame, header included.
pub const MAX_FRAME_LEN: usize = 16384;

/// Lookup reply status: the queried name does not exist. A valid outcome,
/// not an error.
pub const STATUS_NOT_FOUND: u16 = 0;

/// Lookup reply status: found, the reply carries a payload.
pub const STATUS_FOUND: u16 = 1;

/// Control frame types, stored as `u16`. Can do `as u16` when needed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
#[repr(u16)]
pub enum CtlType {
    /// One-shot lookup query (client to daemon).
    LookupQuery = 1,

    /// Reply correlated with a [CtlType::LookupQuery] (daemon to client).
    LookupReply = 2,

    /// Register browse interest in an application/protocol pair
    /// (client to daemon).
    Subscribe = 3,

    /// A service or category became visible (daemon to client).
    ServiceUp = 4,

    /// A service or category went away (daemon to client).
    ServiceDown = 5,
}

impl CtlType {
    /// Converts `u16` into `CtlType` if possible.
    pub const fn from_u16(value: u16) -> Option<CtlType> {
        match value {
            1 => Some(CtlType::LookupQuery),
            2 => Some(CtlType::LookupReply),
            3 => Some(CtlType::Subscribe),
            4 => Some(CtlType::ServiceUp),
            5 => Some(CtlType::ServiceDown),
            _ => None,
        }
    }
}

impl fmt::Display for CtlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtlType::LookupQuery => write!(f, "LOOKUP_QUERY"),
            CtlType::LookupReply => write!(f, "LOOKUP_REPLY"),
            CtlType::Subscribe => write!(f, "SUBSCRIBE"),
            CtlType::ServiceUp => write!(f, "SERVICE_UP"),
            CtlType::ServiceDown => write!(f, "SERVICE_DOWN"),
        }
    }
}

/// The record kind a lookup query asks for. The values follow the DNS
/// resource record type numbers the resolver daemon works with.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
#[repr(u16)]
pub enum LookupKind {
    /// Forward lookup of an IPv4 address.
    Address = 1,

    /// Reverse lookup of a hostname for an address.
    Reverse = 12,

    /// Host information (cpu and os strings).
    HostInfo = 13,

    /// Text record.
    Text = 16,
}

impl LookupKind {
    /// Converts `u16` into `LookupKind` if possible.
    pub const fn from_u16(value: u16) -> Option<LookupKind> {
        match value {
            1 => Some(LookupKind::Address),
            12 => Some(LookupKind::Reverse),
            13 => Some(LookupKind::HostInfo),
            16 => Some(LookupKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Address => write!(f, "ADDRESS"),
            LookupKind::Reverse => write!(f, "REVERSE"),
            LookupKind::HostInfo => write!(f, "HINFO"),
            LookupKind::Text => write!(f, "TXT"),
        }
    }
}

/// Whether a browse event reports something appearing or going away.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ServiceState {
    Up,
    Down,
}

impl ServiceState {
    const fn frame_type(self) -> CtlType {
        match self {
            ServiceState::Up => CtlType::ServiceUp,
            ServiceState::Down => CtlType::ServiceDown,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Up => write!(f, "up"),
            ServiceState::Down => write!(f, "down"),
        }
    }
}

/// The decoded fixed header of one frame.
///
/// `ty` is `None` for frame types this client does not know; the caller is
/// expected to skip over `payload_len` bytes and carry on.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub ty: Option<CtlType>,
    pub token: u32,
    payload_len: usize,
}

impl FrameHeader {
    /// Parses the 8 header bytes and validates the declared length.
    pub fn parse(buf: &[u8; CTL_HEADER_LEN]) -> Result<Self> {
        let len = u16_from_be_slice(&buf[..2]) as usize;
        let ty = u16_from_be_slice(&buf[2..4]);
        let token = u32_from_be_slice(&buf[4..8]);

        if len < CTL_HEADER_LEN || len > MAX_FRAME_LEN {
            return Err(Error::Malformed(format!(
                "frame length {len} out of bounds"
            )));
        }

        Ok(Self {
            ty: CtlType::from_u16(ty),
            token,
            payload_len: len - CTL_HEADER_LEN,
        })
    }

    /// Number of payload bytes that follow the header on the wire.
    pub const fn payload_len(&self) -> usize {
        self.payload_len
    }
}

/// An outgoing control frame under construction.
///
/// The header is reserved up front; `finish` patches the final length in.
pub struct CtlOutgoing {
    data: Vec<u8>,
}

impl CtlOutgoing {
    pub fn new(ty: CtlType, token: u32) -> Self {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&[0u8, 0]); // len, patched in finish()
        data.extend_from_slice(&(ty as u16).to_be_bytes());
        data.extend_from_slice(&token.to_be_bytes());
        Self { data }
    }

    fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed character-string. `None` and `Some("")`
    /// both encode as a zero length byte.
    fn write_char_string(&mut self, s: Option<&str>) -> Result<()> {
        let bytes = s.unwrap_or("").as_bytes();
        if bytes.len() > u8::MAX as usize {
            return Err(Error::Msg(format!(
                "character-string too long: {} bytes",
                bytes.len()
            )));
        }
        self.data.push(bytes.len() as u8);
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Finalizes the frame: patches the length field and returns the bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let len = self.data.len();
        if len > MAX_FRAME_LEN {
            return Err(Error::Msg(format!("frame too long: {len} bytes")));
        }
        self.data[..2].copy_from_slice(&(len as u16).to_be_bytes());
        Ok(self.data)
    }
}

/// Encodes a subscribe request. Both fields absent means the wildcard
/// subscription covering every top-level application category.
pub fn encode_subscribe(
    application: Option<&str>,
    protocol: Option<&str>,
    token: u32,
) -> Result<Vec<u8>> {
    let mut out = CtlOutgoing::new(CtlType::Subscribe, token);
    out.write_char_string(application)?;
    out.write_char_string(protocol)?;
    out.finish()
}

/// Encodes a one-shot lookup query.
pub fn encode_lookup_query(kind: LookupKind, name: &str, token: u32) -> Result<Vec<u8>> {
    let mut out = CtlOutgoing::new(CtlType::LookupQuery, token);
    out.write_u16(kind as u16);
    out.write_char_string(Some(name))?;
    out.finish()
}

/// The payload of a successful lookup reply.
///
/// This is the daemon side of the lookup codec. The client decodes replies
/// directly off [CtlIncoming] because it knows which kind it asked for;
/// daemon implementations and test harnesses use this to produce the frames
/// a client consumes.
#[derive(Debug)]
pub enum ReplyBody<'a> {
    /// No payload (not-found and error replies).
    Empty,
    Address(Ipv4Addr),
    HostInfo { cpu: &'a str, os: &'a str },
    Text(&'a str),
    Hostname(&'a str),
}

/// Encodes a lookup reply frame for `token` with the given status and body.
pub fn encode_lookup_reply(token: u32, status: u16, body: &ReplyBody<'_>) -> Result<Vec<u8>> {
    let mut out = CtlOutgoing::new(CtlType::LookupReply, token);
    out.write_u16(status);
    match body {
        ReplyBody::Empty => {}
        ReplyBody::Address(addr) => out.write_bytes(&addr.octets()),
        ReplyBody::HostInfo { cpu, os } => {
            out.write_char_string(Some(cpu))?;
            out.write_char_string(Some(os))?;
        }
        ReplyBody::Text(txt) => out.write_char_string(Some(txt))?,
        ReplyBody::Hostname(name) => out.write_char_string(Some(name))?,
    }
    out.finish()
}

/// Encodes a browse event frame. `name` is `None` for a category
/// announcement, `Some` for a concrete service instance.
pub fn encode_service_event(
    state: ServiceState,
    name: Option<&str>,
    application: &str,
    protocol: &str,
) -> Result<Vec<u8>> {
    let mut out = CtlOutgoing::new(state.frame_type(), 0);
    out.write_char_string(name)?;
    out.write_char_string(Some(application))?;
    out.write_char_string(Some(protocol))?;
    out.finish()
}

/// A read cursor over the payload of one received frame.
#[derive(Debug)]
pub struct CtlIncoming {
    data: Vec<u8>,
    offset: usize,
}

impl CtlIncoming {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        if self.data.len() - self.offset < count {
            return Err(Error::Malformed(format!(
                "payload truncated: wanted {count} bytes, {} left",
                self.data.len() - self.offset
            )));
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16_from_be_slice(self.take(2)?))
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        let slice = self.take(4)?;
        Ok(Ipv4Addr::new(slice[0], slice[1], slice[2], slice[3]))
    }

    /// Reads a character-string; an empty one comes back as `""`.
    pub fn read_char_string(&mut self) -> Result<String> {
        let length = self.take(1)?[0] as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Malformed(format!("character-string not utf-8: {e}")))
    }

    /// Reads a character-string where empty means absent.
    pub fn read_opt_char_string(&mut self) -> Result<Option<String>> {
        let s = self.read_char_string()?;
        Ok(if s.is_empty() { None } else { Some(s) })
    }
}

/// An asynchronous browse event from the daemon.
///
/// `name` present means a concrete service instance; absent means the event
/// announces an application/protocol category that can be subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtlEvent {
    pub state: ServiceState,
    pub name: Option<String>,
    pub application: String,
    pub protocol: String,
}

/// A reply to a lookup query. The payload stays undecoded in `body` until
/// the dispatcher, which knows which [LookupKind] it asked for, reads it.
#[derive(Debug)]
pub struct LookupReply {
    pub token: u32,
    pub status: u16,
    pub body: CtlIncoming,
}

/// One fully decoded control frame.
#[derive(Debug)]
#[non_exhaustive]
pub enum CtlMessage {
    /// Browse interest registration (client to daemon).
    Subscribe {
        application: Option<String>,
        protocol: Option<String>,
    },

    /// One-shot lookup query (client to daemon).
    LookupQuery {
        kind: LookupKind,
        name: String,
        token: u32,
    },

    /// Correlated lookup reply (daemon to client).
    LookupReply(LookupReply),

    /// Asynchronous browse event (daemon to client).
    Event(CtlEvent),
}

/// Decodes the payload of a frame whose header was already parsed.
pub fn decode_frame(ty: CtlType, token: u32, payload: Vec<u8>) -> Result<CtlMessage> {
    let mut body = CtlIncoming::new(payload);

    trace!("decode frame type {} token {}", ty, token);

    let msg = match ty {
        CtlType::Subscribe => CtlMessage::Subscribe {
            application: body.read_opt_char_string()?,
            protocol: body.read_opt_char_string()?,
        },
        CtlType::LookupQuery => {
            let kind_num = body.read_u16()?;
            let kind = LookupKind::from_u16(kind_num)
                .ok_or_else(|| Error::Malformed(format!("unknown lookup kind {kind_num}")))?;
            CtlMessage::LookupQuery {
                kind,
                name: body.read_char_string()?,
                token,
            }
        }
        CtlType::LookupReply => {
            let status = body.read_u16()?;
            CtlMessage::LookupReply(LookupReply {
                token,
                status,
                body,
            })
        }
        CtlType::ServiceUp | CtlType::ServiceDown => {
            let state = if ty == CtlType::ServiceUp {
                ServiceState::Up
            } else {
                ServiceState::Down
            };
            CtlMessage::Event(CtlEvent {
                state,
                name: body.read_opt_char_string()?,
                application: body.read_char_string()?,
                protocol: body.read_char_string()?,
            })
        }
    };

    Ok(msg)
}

fn u16_from_be_slice(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn u32_from_be_slice(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
