//! Agent Runtime Abstractions
//!
//! The live agent is consumed through two channels per connection: a
//! [`LiveRequestQueue`] carrying client input towards the agent, and an
//! [`AgentEventStream`] carrying the agent's output back. [`AgentRunner`]
//! connects the two for a session; [`Tool`] is the seam through which the
//! agent triggers side effects such as page generation.

use crate::session::SessionHandle;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use tokio::sync::mpsc;

/// Format of the audio the browser streams upstream: 16-bit PCM, 16 kHz, mono.
pub const INBOUND_AUDIO_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// A chunk of binary media tagged with its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Bytes,
}

impl Blob {
    pub fn inbound_audio(data: Bytes) -> Self {
        Self {
            mime_type: INBOUND_AUDIO_MIME_TYPE.to_string(),
            data,
        }
    }
}

/// Input forwarded from a client connection to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveRequest {
    /// Streaming media, forwarded as-is.
    Realtime(Blob),
    /// A complete text turn from the user.
    Content(String),
    /// The user stopped speaking.
    ActivityEnd,
    /// No more input will follow.
    Close,
}

#[derive(Debug, thiserror::Error)]
#[error("live request queue is closed")]
pub struct QueueClosed;

pub type LiveRequestReceiver = mpsc::UnboundedReceiver<LiveRequest>;

/// The sending side of the agent's input channel.
#[derive(Debug, Clone)]
pub struct LiveRequestQueue {
    tx: mpsc::UnboundedSender<LiveRequest>,
}

impl LiveRequestQueue {
    pub fn new() -> (Self, LiveRequestReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send_realtime(&self, blob: Blob) -> Result<(), QueueClosed> {
        self.send(LiveRequest::Realtime(blob))
    }

    pub fn send_content(&self, text: impl Into<String>) -> Result<(), QueueClosed> {
        self.send(LiveRequest::Content(text.into()))
    }

    pub fn send_activity_end(&self) -> Result<(), QueueClosed> {
        self.send(LiveRequest::ActivityEnd)
    }

    /// Signals end of input. Safe to call more than once.
    pub fn close(&self) {
        let _ = self.tx.send(LiveRequest::Close);
    }

    fn send(&self, request: LiveRequest) -> Result<(), QueueClosed> {
        self.tx.send(request).map_err(|_| QueueClosed)
    }
}

/// A live transcript delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// `true` while more text for the same utterance may follow.
    pub partial: bool,
}

/// One unit of agent output. Any combination of fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEvent {
    /// PCM audio for playback (16-bit, 24 kHz).
    pub audio: Option<Bytes>,
    pub text: Option<String>,
    pub input_transcription: Option<Transcript>,
    pub output_transcription: Option<Transcript>,
}

impl AgentEvent {
    pub fn audio(data: impl Into<Bytes>) -> Self {
        Self {
            audio: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn input_transcription(text: impl Into<String>, partial: bool) -> Self {
        Self {
            input_transcription: Some(Transcript {
                text: text.into(),
                partial,
            }),
            ..Default::default()
        }
    }

    pub fn output_transcription(text: impl Into<String>, partial: bool) -> Self {
        Self {
            output_transcription: Some(Transcript {
                text: text.into(),
                partial,
            }),
            ..Default::default()
        }
    }
}

/// The agent's output for one live run. Not restartable; ends when the run ends.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = anyhow::Result<AgentEvent>> + Send>>;

/// Starts live runs against the remote agent service.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Opens a live run for `session`, consuming `requests` until the queue
    /// is closed and yielding the agent's output.
    async fn run_live(
        &self,
        session: SessionHandle,
        requests: LiveRequestReceiver,
    ) -> anyhow::Result<AgentEventStream>;
}

/// What a tool knows about the invocation it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub session_id: String,
}

/// A function the agent may call during a live run.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the call arguments.
    fn parameters(&self) -> Value;

    /// Executes the call. Failures are reported inside the returned value so
    /// the agent can talk about them; they never abort the run.
    async fn call(&self, args: Value, ctx: &ToolContext) -> Value;
}
