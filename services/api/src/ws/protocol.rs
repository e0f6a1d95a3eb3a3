//! Defines the WebSocket message protocol between the browser client and the API server.

use anyhow::{Result, anyhow};
use axum::extract::ws::Message;
use bytes::Bytes;
use encyclopedia_core::page::ContentPage;
use futures_util::{Sink, SinkExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// JSON control messages sent by the client on the voice channel.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// A typed user turn.
    Text { data: String },
    /// The user stopped speaking.
    AudioEnd,
}

/// One decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Raw PCM, 16-bit 16 kHz mono.
    Audio(Bytes),
    Control(ControlMessage),
    /// Ping and pong frames, answered by the transport.
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error("client disconnected")]
    Disconnected,
    #[error("websocket transport error: {0}")]
    Transport(axum::Error),
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decodes the result of one read from the client connection.
pub fn decode_inbound(
    next: Option<Result<Message, axum::Error>>,
) -> Result<InboundFrame, InboundError> {
    match next {
        None | Some(Ok(Message::Close(_))) => Err(InboundError::Disconnected),
        Some(Err(e)) => Err(InboundError::Transport(e)),
        Some(Ok(Message::Binary(data))) => Ok(InboundFrame::Audio(data)),
        Some(Ok(Message::Text(text))) => {
            Ok(InboundFrame::Control(serde_json::from_str(text.as_str())?))
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(InboundFrame::Ignored),
    }
}

/// JSON events sent to the client on the voice channel.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    VoiceReady { data: String },
    /// Speakable agent text.
    Transcription { data: String, is_output: bool },
    InputTranscription { data: String, partial: bool },
    OutputTranscription { data: String },
    Error { data: String },
}

/// JSON events sent to the client on the content channel.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentEvent<'a> {
    EncyclopediaPage(&'a ContentPage),
}

/// Serializes `event` and writes it to the client as a text frame.
pub async fn send_json<S, T>(sink: &mut S, event: &T) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    T: Serialize,
{
    let serialized = serde_json::to_string(event)?;
    sink.send(Message::Text(serialized.into()))
        .await
        .map_err(|e| anyhow!("failed to send to client: {}", e))
}

pub async fn send_binary<S>(sink: &mut S, data: Bytes) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    sink.send(Message::Binary(data))
        .await
        .map_err(|e| anyhow!("failed to send to client: {}", e))
}
