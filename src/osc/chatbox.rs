//! VRChat chatbox sink
//!
//! Fire-and-forget UDP delivery of chatbox text. There is no acknowledgement
//! channel, so a successful `send` only means the datagram left the socket.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{info, trace};

use super::{OscArg, OscMessage};
use crate::config::OscConfig;

/// Upper bound on a single datagram write
const SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// One-way text transport toward the chat receiver
///
/// Sends are synchronous: a datagram write never waits on the peer, which
/// lets callers keep a lock across the send when they need to.
pub trait MessageSink: Send + Sync {
    /// Deliver `text`; `instant` asks the receiver to display it immediately
    /// instead of opening its keyboard UI
    fn send(&self, text: &str, instant: bool) -> Result<()>;
}

/// OSC sink targeting VRChat's `/chatbox/input`
pub struct OscChatboxSink {
    socket: UdpSocket,
    target: SocketAddr,
    address: String,
    max_chars: usize,
}

impl OscChatboxSink {
    /// Bind an ephemeral local socket and resolve the receiver address
    pub fn connect(host: &str, port: u16, address: &str, max_chars: usize) -> Result<Self> {
        let target = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve OSC target {}:{}", host, port))?
            .next()
            .with_context(|| format!("No address found for OSC target {}:{}", host, port))?;

        let bind_addr = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).context("Failed to bind OSC send socket")?;
        socket
            .set_write_timeout(Some(SEND_TIMEOUT))
            .context("Failed to set OSC socket write timeout")?;

        info!("📡 OSC chatbox sink ready → {} {}", target, address);

        Ok(Self {
            socket,
            target,
            address: address.to_string(),
            max_chars,
        })
    }

    /// Create from config
    pub fn from_config(config: &OscConfig) -> Result<Self> {
        Self::connect(
            &config.host,
            config.port,
            &config.chatbox_address,
            config.max_message_chars,
        )
    }
}

impl MessageSink for OscChatboxSink {
    fn send(&self, text: &str, instant: bool) -> Result<()> {
        let text = truncate_chars(text, self.max_chars);
        let packet = OscMessage::new(self.address.as_str())
            .with_arg(OscArg::Str(text.into_owned()))
            .with_arg(OscArg::Bool(instant))
            .encode();

        self.socket
            .send_to(&packet, self.target)
            .with_context(|| format!("Failed to send OSC packet to {}", self.target))?;

        trace!("OSC → {} ({} bytes)", self.address, packet.len());
        Ok(())
    }
}

/// Cut `text` to at most `max` characters (not bytes)
fn truncate_chars(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(text[..cut].to_string()),
        None => Cow::Borrowed(text),
    }
}
