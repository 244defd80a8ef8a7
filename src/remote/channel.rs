//! In-memory remote link
//!
//! Connects a session to a [`RemotePeer`] held by the caller, which plays
//! the agent: it injects events and observes everything the session sends.

use tokio::sync::mpsc;

use super::{Outbound, OutboundSender, RemoteEvent, RemoteLink};
use crate::floor::Role;
use crate::voice::encode_pcm16;

/// The agent side of an in-memory link
#[derive(Debug)]
pub struct RemotePeer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<RemoteEvent>,
}

/// Create a connected link and peer
///
/// `capacity` bounds the inbound event queue.
#[must_use]
pub fn pair(capacity: usize) -> (RemoteLink, RemotePeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(capacity.max(1));

    let link = RemoteLink::new(OutboundSender::new(out_tx), event_rx);
    let peer = RemotePeer {
        outbound: out_rx,
        events: event_tx,
    };
    (link, peer)
}

impl RemotePeer {
    /// Deliver an event to the session; `false` once the session is gone
    pub async fn send(&self, event: RemoteEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Deliver agent speech
    pub async fn speak(&self, samples: &[f32], sample_rate: u32) -> bool {
        self.send(RemoteEvent::AudioChunk {
            pcm16: encode_pcm16(samples),
            sample_rate,
        })
        .await
    }

    /// Deliver a transcription delta
    pub async fn transcribe(&self, role: Role, text: &str) -> bool {
        self.send(RemoteEvent::Transcript {
            role,
            text: text.to_string(),
        })
        .await
    }

    /// Next message the session sent, waiting if none is queued
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Everything the session has sent so far
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}
