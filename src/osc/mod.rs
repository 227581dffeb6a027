//! OSC utilities and message types
//!
//! Provides OSC 1.0 message encoding and parsing, plus the chatbox sink
//! that pushes text into VRChat.

pub mod chatbox;

use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

pub use chatbox::{MessageSink, OscChatboxSink};

/// Marker that opens every OSC bundle
const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// OSC argument types used by VRChat
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    /// OSC-string (`s`)
    Str(String),

    /// 32-bit big-endian integer (`i`)
    Int(i32),

    /// 32-bit big-endian float (`f`)
    Float(f32),

    /// Boolean, carried entirely in the type tag (`T` / `F`)
    Bool(bool),
}

impl OscArg {
    fn type_tag(&self) -> char {
        match self {
            OscArg::Str(_) => 's',
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
        }
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OscArg::Str(s) => write!(f, "{:?}", s),
            OscArg::Int(i) => write!(f, "{}", i),
            OscArg::Float(v) => write!(f, "{}", v),
            OscArg::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A single OSC message: address pattern plus typed arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// Create a message with no arguments
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument (builder style)
    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Encode to OSC 1.0 wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(padded_len(self.address.len()) + 32);

        put_padded_str(&mut buf, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::type_tag));
        put_padded_str(&mut buf, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Str(s) => put_padded_str(&mut buf, s),
                OscArg::Int(i) => buf.put_i32(*i),
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::Bool(_) => {}
            }
        }

        buf.freeze()
    }

    /// Parse a single (non-bundle) OSC message
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = data;

        let address = read_padded_str(&mut cursor).context("Invalid OSC address")?;
        if !address.starts_with('/') {
            bail!("OSC address must start with '/': {:?}", address);
        }

        // Older senders omit the type tag string entirely
        if cursor.is_empty() {
            return Ok(Self::new(address));
        }

        let tags = read_padded_str(&mut cursor).context("Invalid OSC type tag string")?;
        let Some(tags) = tags.strip_prefix(',') else {
            bail!("OSC type tag string must start with ',': {:?}", tags);
        };

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                's' => OscArg::Str(read_padded_str(&mut cursor)?),
                'i' => {
                    ensure_remaining(cursor, 4, "int32")?;
                    OscArg::Int(cursor.get_i32())
                }
                'f' => {
                    ensure_remaining(cursor, 4, "float32")?;
                    OscArg::Float(cursor.get_f32())
                }
                'T' => OscArg::Bool(true),
                'F' => OscArg::Bool(false),
                other => bail!("Unsupported OSC type tag '{}'", other),
            };
            args.push(arg);
        }

        Ok(Self { address, args })
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Parse an OSC packet, flattening bundles into their messages
pub fn decode_packet(data: &[u8]) -> Result<Vec<OscMessage>> {
    if !data.starts_with(BUNDLE_TAG) {
        return Ok(vec![OscMessage::parse(data)?]);
    }

    // Skip "#bundle\0" and the 8-byte time tag
    let mut cursor = data;
    ensure_remaining(cursor, 16, "bundle header")?;
    cursor.advance(16);

    let mut messages = Vec::new();
    while !cursor.is_empty() {
        ensure_remaining(cursor, 4, "bundle element size")?;
        let size = cursor.get_i32();
        let size = usize::try_from(size).context("Negative OSC bundle element size")?;
        ensure_remaining(cursor, size, "bundle element")?;
        messages.extend(decode_packet(&cursor[..size])?);
        cursor.advance(size);
    }

    Ok(messages)
}

/// Format raw packet bytes as hex for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Length of an OSC-string once NUL-terminated and padded to 4 bytes
fn padded_len(len: usize) -> usize {
    (len / 4 + 1) * 4
}

fn put_padded_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, padded_len(s.len()) - s.len());
}

fn read_padded_str(cursor: &mut &[u8]) -> Result<String> {
    let end = cursor
        .iter()
        .position(|&b| b == 0)
        .context("Unterminated OSC string")?;
    let s = std::str::from_utf8(&cursor[..end])
        .context("OSC string is not valid UTF-8")?
        .to_string();

    let padded = padded_len(end);
    ensure_remaining(cursor, padded, "string padding")?;
    cursor.advance(padded);

    Ok(s)
}

fn ensure_remaining(cursor: &[u8], needed: usize, what: &str) -> Result<()> {
    if cursor.len() < needed {
        bail!(
            "Truncated OSC packet: need {} bytes for {}, have {}",
            needed,
            what,
            cursor.len()
        );
    }
    Ok(())
}
