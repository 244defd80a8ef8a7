//! Remote conversational-agent session
//!
//! The session talks to the agent through a [`RemoteLink`]: a fire-and-forget
//! sink for outbound audio and text plus a stream of inbound events. Two
//! transports are provided, an in-memory [`channel`] pair and a JSON
//! WebSocket ([`ws`]).

pub mod channel;
pub mod ws;

use tokio::sync::mpsc;

use crate::floor::Role;

/// Inbound event from the remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// Agent speech as 16-bit little-endian PCM
    AudioChunk { pcm16: Vec<u8>, sample_rate: u32 },
    /// Incremental transcription
    Transcript { role: Role, text: String },
    /// The agent stopped its current turn
    Interrupted,
    /// Transport or session failure
    Error(String),
    /// The remote closed the session
    Closed,
}

/// Outbound message to the remote session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Session instructions and voice, sent once after connecting
    Setup { instructions: String, voice: String },
    /// Microphone audio as 16-bit little-endian PCM
    Audio { pcm16: Vec<u8>, sample_rate: u32 },
    /// Text prompt
    Text(String),
}

/// Fire-and-forget outbound half of a remote session
pub trait RemoteSink: Send {
    fn send_audio(&mut self, pcm16: Vec<u8>, sample_rate: u32);

    fn send_text(&mut self, text: &str);

    /// Stop sending; the transport closes once queued messages flush
    fn close(&mut self);
}

/// [`RemoteSink`] backed by an unbounded queue drained by the transport
#[derive(Debug)]
pub struct OutboundSender {
    tx: Option<mpsc::UnboundedSender<Outbound>>,
}

impl OutboundSender {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx: Some(tx) }
    }

    fn send(&self, message: Outbound) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(message).is_err() {
            tracing::trace!("remote transport gone, outbound message dropped");
        }
    }
}

impl RemoteSink for OutboundSender {
    fn send_audio(&mut self, pcm16: Vec<u8>, sample_rate: u32) {
        self.send(Outbound::Audio { pcm16, sample_rate });
    }

    fn send_text(&mut self, text: &str) {
        self.send(Outbound::Text(text.to_string()));
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!("remote outbound closed");
        }
    }
}

/// Both halves of a connected remote session
pub struct RemoteLink {
    pub sink: Box<dyn RemoteSink>,
    pub events: mpsc::Receiver<RemoteEvent>,
}

impl RemoteLink {
    #[must_use]
    pub fn new(sink: impl RemoteSink + 'static, events: mpsc::Receiver<RemoteEvent>) -> Self {
        Self {
            sink: Box::new(sink),
            events,
        }
    }
}

impl std::fmt::Debug for RemoteLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteLink").finish_non_exhaustive()
    }
}
