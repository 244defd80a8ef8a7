//! WebSocket remote link
//!
//! JSON text frames in both directions. Audio travels as base64 PCM16.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::{Outbound, OutboundSender, RemoteEvent, RemoteLink};
use crate::floor::Role;
use crate::voice::OUTPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// Inbound events buffered ahead of the session task
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    Setup {
        instructions: &'a str,
        voice: &'a str,
    },
    Audio {
        data: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Audio {
        data: String,
        #[serde(rename = "sampleRate", default = "default_output_rate")]
        sample_rate: u32,
    },
    Transcript {
        role: Role,
        text: String,
    },
    Interrupted,
    Error {
        message: String,
    },
}

const fn default_output_rate() -> u32 {
    OUTPUT_SAMPLE_RATE
}

/// Serialize an outbound message as a JSON text frame
///
/// # Errors
///
/// Returns error if serialization fails
pub fn encode_outbound(message: &Outbound) -> Result<String> {
    let wire = match message {
        Outbound::Setup {
            instructions,
            voice,
        } => ClientMessage::Setup {
            instructions,
            voice,
        },
        Outbound::Audio { pcm16, sample_rate } => ClientMessage::Audio {
            data: STANDARD.encode(pcm16),
            sample_rate: *sample_rate,
        },
        Outbound::Text(text) => ClientMessage::Text { text },
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Parse a server text frame
///
/// # Errors
///
/// Returns `Serialization` for malformed JSON and `Decode` for bad base64
pub fn decode_inbound(text: &str) -> Result<RemoteEvent> {
    let event = match serde_json::from_str::<ServerMessage>(text)? {
        ServerMessage::Audio { data, sample_rate } => RemoteEvent::AudioChunk {
            pcm16: STANDARD
                .decode(data)
                .map_err(|e| Error::Decode(format!("invalid base64 audio: {e}")))?,
            sample_rate,
        },
        ServerMessage::Transcript { role, text } => RemoteEvent::Transcript { role, text },
        ServerMessage::Interrupted => RemoteEvent::Interrupted,
        ServerMessage::Error { message } => RemoteEvent::Error(message),
    };
    Ok(event)
}

/// Connect to `url` and send the session setup
///
/// # Errors
///
/// Returns `RemoteSession` if the connection or handshake fails
pub async fn connect(
    url: &str,
    token: Option<&str>,
    instructions: &str,
    voice: &str,
) -> Result<RemoteLink> {
    let mut request = url
        .into_client_request()
        .map_err(|e| Error::RemoteSession(format!("invalid remote url: {e}")))?;

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::RemoteSession(format!("invalid token: {e}")))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::RemoteSession(format!("connect to {url} failed: {e}")))?;

    tracing::info!(url, "remote session connected");

    let (mut write, mut read) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

    out_tx
        .send(Outbound::Setup {
            instructions: instructions.to_string(),
            voice: voice.to_string(),
        })
        .map_err(|_| Error::RemoteSession("writer closed before setup".to_string()))?;

    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let text = match encode_outbound(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::text(text)).await {
                tracing::warn!(error = %e, "remote send failed");
                break;
            }
        }
        let _ = write.close().await;
        tracing::debug!("remote writer finished");
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let event = match frame {
                Ok(Message::Text(text)) => match decode_inbound(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed server message");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "remote closed the session");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    let _ = event_tx.send(RemoteEvent::Error(e.to_string())).await;
                    return;
                }
            };
            if event_tx.send(event).await.is_err() {
                return;
            }
        }
        let _ = event_tx.send(RemoteEvent::Closed).await;
    });

    Ok(RemoteLink::new(OutboundSender::new(out_tx), event_rx))
}
