//! Binary object packing used by the spribe and jdb brands.
//!
//! A packet is a one-byte header, a big-endian length, then a serialized
//! object:
//!
//! ```text
//! 0x80 | len:u16 | object            (small packet)
//! 0x88 | len:u32 | object            (big packet, header bit 0x08)
//! ```
//!
//! Every message on the wire is the object `{c: controller, a: action,
//! p: params}`. Controller 0 carries system requests (handshake, login,
//! ping); controller 1 action 13 carries game ("extension") requests whose
//! params are `{c: command name, p: command params}`.
//!
//! Compressed packets (header bit 0x20) are not supported.

use bytes::{Buf, BufMut};

use crate::{Command, ProtocolError};

const HEADER_BINARY: u8 = 0x80;
const HEADER_COMPRESSED: u8 = 0x20;
const HEADER_BIG_SIZE: u8 = 0x08;

pub const CONTROLLER_SYSTEM: u8 = 0;
pub const CONTROLLER_EXTENSION: u8 = 1;
pub const ACTION_HANDSHAKE: i16 = 0;
pub const ACTION_LOGIN: i16 = 1;
pub const ACTION_EXTENSION: i16 = 13;
pub const ACTION_PING: i16 = 29;

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const BYTE: u8 = 2;
    pub const SHORT: u8 = 3;
    pub const INT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const FLOAT: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const UTF_STRING: u8 = 8;
    pub const BYTE_ARRAY: u8 = 10;
    pub const ARRAY: u8 = 17;
    pub const OBJECT: u8 = 18;
    pub const TEXT: u8 = 20;
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SfsValue {
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Utf(String),
    Text(String),
    ByteArray(Vec<u8>),
    Array(Vec<SfsValue>),
    Object(SfsObject),
}

impl SfsValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SfsValue::Utf(s) | SfsValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            SfsValue::Byte(v) => Some(v.into()),
            SfsValue::Short(v) => Some(v.into()),
            SfsValue::Int(v) => Some(v.into()),
            SfsValue::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&SfsObject> {
        match self {
            SfsValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<&str> for SfsValue {
    fn from(s: &str) -> Self {
        SfsValue::Utf(s.to_owned())
    }
}

impl From<String> for SfsValue {
    fn from(s: String) -> Self {
        SfsValue::Utf(s)
    }
}

impl From<SfsObject> for SfsValue {
    fn from(o: SfsObject) -> Self {
        SfsValue::Object(o)
    }
}

/// An ordered string-keyed map. Insertion order is kept on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfsObject {
    entries: Vec<(String, SfsValue)>,
}

impl SfsObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SfsValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SfsValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&SfsValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SfsValue::as_str)
    }

    pub fn get_object(&self, key: &str) -> Option<&SfsObject> {
        self.get(key).and_then(SfsValue::as_object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SfsValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Serializes the object body (type tag included, no packet header).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_value(&mut buf, &SfsValue::Object(self.clone()));
        buf
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(mut data: &[u8]) -> Result<Self, ProtocolError> {
        match read_value(&mut data, 0)? {
            SfsValue::Object(obj) => Ok(obj),
            _ => Err(ProtocolError::InvalidMessage(
                "top-level value is not an object".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn write_str16(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    buf.put_u16(len as u16);
    buf.put_slice(&bytes[..len]);
}

fn write_value(buf: &mut Vec<u8>, value: &SfsValue) {
    match value {
        SfsValue::Null => buf.put_u8(tag::NULL),
        SfsValue::Bool(v) => {
            buf.put_u8(tag::BOOL);
            buf.put_u8(u8::from(*v));
        }
        SfsValue::Byte(v) => {
            buf.put_u8(tag::BYTE);
            buf.put_u8(*v);
        }
        SfsValue::Short(v) => {
            buf.put_u8(tag::SHORT);
            buf.put_i16(*v);
        }
        SfsValue::Int(v) => {
            buf.put_u8(tag::INT);
            buf.put_i32(*v);
        }
        SfsValue::Long(v) => {
            buf.put_u8(tag::LONG);
            buf.put_i64(*v);
        }
        SfsValue::Float(v) => {
            buf.put_u8(tag::FLOAT);
            buf.put_f32(*v);
        }
        SfsValue::Double(v) => {
            buf.put_u8(tag::DOUBLE);
            buf.put_f64(*v);
        }
        SfsValue::Utf(s) => {
            buf.put_u8(tag::UTF_STRING);
            write_str16(buf, s);
        }
        SfsValue::Text(s) => {
            buf.put_u8(tag::TEXT);
            buf.put_i32(s.len() as i32);
            buf.put_slice(s.as_bytes());
        }
        SfsValue::ByteArray(b) => {
            buf.put_u8(tag::BYTE_ARRAY);
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
        SfsValue::Array(items) => {
            buf.put_u8(tag::ARRAY);
            buf.put_u16(items.len() as u16);
            for item in items {
                write_value(buf, item);
            }
        }
        SfsValue::Object(obj) => {
            buf.put_u8(tag::OBJECT);
            buf.put_u16(obj.entries.len() as u16);
            for (k, v) in &obj.entries {
                write_str16(buf, k);
                write_value(buf, v);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn need(buf: &[u8], n: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < n {
        return Err(ProtocolError::Truncated {
            needed: n - buf.remaining(),
        });
    }
    Ok(())
}

fn read_string(buf: &mut &[u8], len: usize) -> Result<String, ProtocolError> {
    need(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| ProtocolError::InvalidMessage(format!("bad utf-8: {e}")))
}

fn read_len32(buf: &mut &[u8]) -> Result<usize, ProtocolError> {
    need(buf, 4)?;
    usize::try_from(buf.get_i32())
        .map_err(|_| ProtocolError::InvalidMessage("negative length".into()))
}

/// Deepest array/object nesting accepted from the wire.
pub const MAX_DEPTH: usize = 64;

fn read_value(buf: &mut &[u8], depth: usize) -> Result<SfsValue, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::InvalidMessage(format!(
            "nesting deeper than {MAX_DEPTH}"
        )));
    }
    need(buf, 1)?;
    let value = match buf.get_u8() {
        tag::NULL => SfsValue::Null,
        tag::BOOL => {
            need(buf, 1)?;
            SfsValue::Bool(buf.get_u8() != 0)
        }
        tag::BYTE => {
            need(buf, 1)?;
            SfsValue::Byte(buf.get_u8())
        }
        tag::SHORT => {
            need(buf, 2)?;
            SfsValue::Short(buf.get_i16())
        }
        tag::INT => {
            need(buf, 4)?;
            SfsValue::Int(buf.get_i32())
        }
        tag::LONG => {
            need(buf, 8)?;
            SfsValue::Long(buf.get_i64())
        }
        tag::FLOAT => {
            need(buf, 4)?;
            SfsValue::Float(buf.get_f32())
        }
        tag::DOUBLE => {
            need(buf, 8)?;
            SfsValue::Double(buf.get_f64())
        }
        tag::UTF_STRING => {
            need(buf, 2)?;
            let len = buf.get_u16() as usize;
            SfsValue::Utf(read_string(buf, len)?)
        }
        tag::TEXT => {
            let len = read_len32(buf)?;
            SfsValue::Text(read_string(buf, len)?)
        }
        tag::BYTE_ARRAY => {
            let len = read_len32(buf)?;
            need(buf, len)?;
            SfsValue::ByteArray(buf.copy_to_bytes(len).to_vec())
        }
        tag::ARRAY => {
            need(buf, 2)?;
            let count = buf.get_u16() as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_value(buf, depth + 1)?);
            }
            SfsValue::Array(items)
        }
        tag::OBJECT => {
            need(buf, 2)?;
            let count = buf.get_u16() as usize;
            let mut obj = SfsObject::new();
            for _ in 0..count {
                need(buf, 2)?;
                let key_len = buf.get_u16() as usize;
                let key = read_string(buf, key_len)?;
                let value = read_value(buf, depth + 1)?;
                obj.entries.push((key, value));
            }
            SfsValue::Object(obj)
        }
        other => return Err(ProtocolError::UnsupportedType(other)),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Wraps an object in a packet header.
pub fn pack(obj: &SfsObject) -> Vec<u8> {
    let body = obj.encode();
    let mut out = Vec::with_capacity(body.len() + 5);
    if body.len() > u16::MAX as usize {
        out.put_u8(HEADER_BINARY | HEADER_BIG_SIZE);
        out.put_u32(body.len() as u32);
    } else {
        out.put_u8(HEADER_BINARY);
        out.put_u16(body.len() as u16);
    }
    out.extend_from_slice(&body);
    out
}

/// Strips the packet header and decodes the object.
pub fn unpack(mut data: &[u8]) -> Result<SfsObject, ProtocolError> {
    need(data, 1)?;
    let header = data.get_u8();
    if header & HEADER_BINARY == 0 {
        return Err(ProtocolError::InvalidMessage(format!(
            "not a binary packet, header {header:#04x}"
        )));
    }
    if header & HEADER_COMPRESSED != 0 {
        return Err(ProtocolError::InvalidMessage(
            "compressed packets are not supported".into(),
        ));
    }
    let len = if header & HEADER_BIG_SIZE != 0 {
        need(data, 4)?;
        data.get_u32() as usize
    } else {
        need(data, 2)?;
        data.get_u16() as usize
    };
    need(data, len)?;
    SfsObject::decode(&data[..len])
}

// ---------------------------------------------------------------------------
// Message envelope
// ---------------------------------------------------------------------------

/// One `{c, a, p}` message.
#[derive(Debug, Clone, PartialEq)]
pub struct SfsMessage {
    pub controller: u8,
    pub action: i16,
    pub params: SfsObject,
}

impl SfsMessage {
    pub fn new(controller: u8, action: i16, params: SfsObject) -> Self {
        Self {
            controller,
            action,
            params,
        }
    }

    /// A game-level response: `{c: 1, a: 13, p: {c: cmd, p: params}}`.
    pub fn extension(cmd: &str, params: SfsObject) -> Self {
        let inner = SfsObject::new().with("c", cmd).with("p", params);
        Self::new(CONTROLLER_EXTENSION, ACTION_EXTENSION, inner)
    }

    pub fn is(&self, controller: u8, action: i16) -> bool {
        self.controller == controller && self.action == action
    }

    pub fn to_packet(&self) -> Vec<u8> {
        let obj = SfsObject::new()
            .with("c", SfsValue::Byte(self.controller))
            .with("a", SfsValue::Short(self.action))
            .with("p", self.params.clone());
        pack(&obj)
    }

    /// Decodes a packet. Missing `c`/`a` read as 0 and a missing `p` as an
    /// empty object; any integer width is accepted for `c` and `a`.
    pub fn from_packet(data: &[u8]) -> Result<Self, ProtocolError> {
        let obj = unpack(data)?;
        let int = |key: &str| obj.get(key).and_then(SfsValue::as_i64).unwrap_or(0);
        let controller = u8::try_from(int("c")).map_err(|_| {
            ProtocolError::InvalidMessage("controller out of range".into())
        })?;
        let action = i16::try_from(int("a")).map_err(|_| {
            ProtocolError::InvalidMessage("action out of range".into())
        })?;
        let params = obj.get_object("p").cloned().unwrap_or_default();
        Ok(Self {
            controller,
            action,
            params,
        })
    }

    /// Converts to the room-facing [`Command`].
    ///
    /// Extension requests become `Action(cmd)` with the encoded inner params
    /// as payload; anything else becomes `Code(controller << 16 | action)`
    /// with the encoded params.
    pub fn into_command(self) -> Result<Command, ProtocolError> {
        if self.is(CONTROLLER_EXTENSION, ACTION_EXTENSION) {
            let cmd = self.params.get_str("c").ok_or_else(|| {
                ProtocolError::InvalidMessage("extension request without c".into())
            })?;
            let inner = self
                .params
                .get_object("p")
                .map(SfsObject::encode)
                .unwrap_or_else(|| SfsObject::new().encode());
            return Ok(Command::action(cmd, inner));
        }
        let code = (u32::from(self.controller) << 16) | u32::from(self.action as u16);
        Ok(Command::code(code, self.params.encode()))
    }
}
