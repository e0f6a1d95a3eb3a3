//! The per-connection voice relay.
//!
//! One relay runs for every voice WebSocket. It resolves the session, opens a
//! live agent run for it and then drives two directions concurrently:
//! upstream forwards client frames into the agent's request queue, downstream
//! forwards agent events back to the client. The directions share one
//! [`CancellationToken`]; whichever exits first cancels it and the other
//! stops at its next await point.

use super::protocol::{
    ControlMessage, InboundError, InboundFrame, ServerEvent, decode_inbound, send_binary,
    send_json,
};
use anyhow::Result;
use axum::extract::ws::Message;
use encyclopedia_core::{
    agent::{AgentEvent, AgentEventStream, AgentRunner, Blob, LiveRequestQueue},
    reasoning,
    session::{APP_NAME, DEFAULT_USER_ID, SessionService},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::{fmt::Display, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct VoiceRelay {
    sessions: Arc<dyn SessionService>,
    agent: Arc<dyn AgentRunner>,
}

impl VoiceRelay {
    pub fn new(sessions: Arc<dyn SessionService>, agent: Arc<dyn AgentRunner>) -> Self {
        Self { sessions, agent }
    }

    /// Runs one client connection to completion.
    ///
    /// The agent's request queue is always closed before this returns.
    #[instrument(
        name = "voice_relay",
        skip_all,
        fields(session_id = %session_id, connection_id = %Uuid::new_v4())
    )]
    pub async fn handle<Si, St>(&self, mut sink: Si, stream: St, session_id: String)
    where
        Si: Sink<Message> + Unpin + Send,
        Si::Error: Display,
        St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    {
        info!("Voice client connected.");

        let session = match self
            .sessions
            .resolve(APP_NAME, DEFAULT_USER_ID, &session_id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Session resolution failed.");
                fail(&mut sink, format!("Failed to create session: {}", e)).await;
                return;
            }
        };

        let (queue, requests) = LiveRequestQueue::new();
        let events = match self.agent.run_live(session.clone(), requests).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = ?e, "Failed to start live agent run.");
                fail(&mut sink, format!("Failed to start voice session: {}", e)).await;
                return;
            }
        };

        let token = CancellationToken::new();
        tokio::join!(
            upstream(stream, &queue, &token),
            downstream(&mut sink, events, &token),
        );

        queue.close();
        let _ = sink.close().await;
        session.touch();
        info!("Voice client disconnected.");
    }
}

/// Reports a fatal setup error and closes the connection.
async fn fail<Si>(sink: &mut Si, message: String)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let _ = send_json(sink, &ServerEvent::Error { data: message }).await;
    let _ = sink.close().await;
}

/// Client to agent. Frames are forwarded strictly in arrival order.
async fn upstream<St>(mut stream: St, queue: &LiveRequestQueue, token: &CancellationToken)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = stream.next() => next,
        };

        let forwarded = match decode_inbound(next) {
            Ok(InboundFrame::Audio(data)) => queue.send_realtime(Blob::inbound_audio(data)),
            Ok(InboundFrame::Control(ControlMessage::Text { data })) => queue.send_content(data),
            Ok(InboundFrame::Control(ControlMessage::AudioEnd)) => queue.send_activity_end(),
            Ok(InboundFrame::Ignored) => continue,
            Err(InboundError::Malformed(e)) => {
                warn!(error = %e, "Dropping malformed control message.");
                continue;
            }
            Err(InboundError::Disconnected) => {
                debug!("Client closed the connection.");
                break;
            }
            Err(InboundError::Transport(e)) => {
                debug!(error = %e, "Client connection failed.");
                break;
            }
        };
        if forwarded.is_err() {
            debug!("Agent request queue closed.");
            break;
        }
    }
    token.cancel();
}

/// Agent to client. Text passes through the reasoning filter.
async fn downstream<Si>(sink: &mut Si, mut events: AgentEventStream, token: &CancellationToken)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let ready = ServerEvent::VoiceReady {
        data: "Voice session ready".to_string(),
    };
    if send_json(sink, &ready).await.is_ok() {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.next() => event,
            };
            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!(error = ?e, "Agent event stream failed.");
                    let _ = send_json(sink, &ServerEvent::Error { data: e.to_string() }).await;
                    break;
                }
                None => {
                    info!("Agent event stream ended.");
                    break;
                }
            };
            if let Err(e) = forward_event(sink, event).await {
                debug!(error = %e, "Client stopped accepting frames.");
                break;
            }
        }
    }
    token.cancel();
}

async fn forward_event<Si>(sink: &mut Si, event: AgentEvent) -> Result<()>
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    if let Some(audio) = event.audio {
        send_binary(sink, audio).await?;
    }
    if let Some(text) = event.text {
        if let Some(rule) = reasoning::classify(&text) {
            debug!(?rule, chars = text.len(), "Suppressed internal reasoning.");
        } else {
            send_json(
                sink,
                &ServerEvent::Transcription {
                    data: text,
                    is_output: true,
                },
            )
            .await?;
        }
    }
    if let Some(transcript) = event.input_transcription {
        send_json(
            sink,
            &ServerEvent::InputTranscription {
                data: transcript.text,
                partial: transcript.partial,
            },
        )
        .await?;
    }
    if let Some(transcript) = event.output_transcription {
        send_json(
            sink,
            &ServerEvent::OutputTranscription {
                data: transcript.text,
            },
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;
    use bytes::Bytes;
    use encyclopedia_core::{agent::LiveRequest, session::InMemorySessionService};
    use futures::channel::mpsc;
    use serde_json::{Value, json};

    type ClientTx = mpsc::UnboundedSender<Result<Message, axum::Error>>;

    fn relay(runner: FakeRunner, max_sessions: usize) -> VoiceRelay {
        VoiceRelay::new(
            Arc::new(InMemorySessionService::new(max_sessions)),
            Arc::new(runner),
        )
    }

    fn send_text(tx: &ClientTx, raw: &str) {
        tx.unbounded_send(Ok(Message::Text(raw.to_string().into())))
            .unwrap();
    }

    fn send_audio(tx: &ClientTx, data: &'static [u8]) {
        tx.unbounded_send(Ok(Message::Binary(Bytes::from_static(data))))
            .unwrap();
    }

    fn json_frames(frames: &[Message]) -> Vec<Value> {
        frames
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(serde_json::from_str(t.as_str()).unwrap()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upstream_preserves_order_and_closes_queue() {
        let (runner, mut forwarded) = FakeRunner::new(vec![], false);
        let relay = relay(runner, 8);
        let (client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        send_audio(&client_tx, b"A1");
        send_audio(&client_tx, b"A2");
        send_text(&client_tx, r#"{"type":"audio_end"}"#);
        drop(client_tx);

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let mut received = Vec::new();
        while let Some(request) = forwarded.recv().await {
            let closed = request == LiveRequest::Close;
            received.push(request);
            if closed {
                break;
            }
        }
        assert_eq!(
            received,
            vec![
                LiveRequest::Realtime(Blob::inbound_audio(Bytes::from_static(b"A1"))),
                LiveRequest::Realtime(Blob::inbound_audio(Bytes::from_static(b"A2"))),
                LiveRequest::ActivityEnd,
                LiveRequest::Close,
            ]
        );

        let frames: Vec<Message> = server_rx.collect().await;
        assert_eq!(json_frames(&frames)[0]["type"], "voice_ready");
    }

    #[tokio::test]
    async fn test_downstream_filters_internal_reasoning() {
        let (runner, _forwarded) = FakeRunner::new(
            vec![
                Ok(AgentEvent::text(
                    "I'll proceed to call generate_encyclopedia_page now",
                )),
                Ok(AgentEvent::text("Great question! Let's explore volcanoes.")),
            ],
            true,
        );
        let relay = relay(runner, 8);
        let (_client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let frames: Vec<Message> = server_rx.collect().await;
        let events = json_frames(&frames);
        assert_eq!(
            events,
            vec![
                json!({ "type": "voice_ready", "data": "Voice session ready" }),
                json!({
                    "type": "transcription",
                    "data": "Great question! Let's explore volcanoes.",
                    "is_output": true
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_downstream_forwards_audio_and_transcripts() {
        let (runner, _forwarded) = FakeRunner::new(
            vec![
                Ok(AgentEvent::audio(Bytes::from_static(b"pcm"))),
                Ok(AgentEvent::input_transcription("tell me", true)),
                Ok(AgentEvent::output_transcription("Sure", true)),
            ],
            true,
        );
        let relay = relay(runner, 8);
        let (_client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let frames: Vec<Message> = server_rx.collect().await;
        assert_eq!(frames[1], Message::Binary(Bytes::from_static(b"pcm")));
        let events = json_frames(&frames);
        assert_eq!(
            events[1],
            json!({ "type": "input_transcription", "data": "tell me", "partial": true })
        );
        assert_eq!(
            events[2],
            json!({ "type": "output_transcription", "data": "Sure" })
        );
    }

    #[tokio::test]
    async fn test_agent_stream_error_is_reported_once() {
        let (runner, mut forwarded) = FakeRunner::new(
            vec![
                Ok(AgentEvent::text("Hello there")),
                Err(anyhow::anyhow!("live session dropped")),
                Ok(AgentEvent::text("never sent")),
            ],
            true,
        );
        let relay = relay(runner, 8);
        let (_client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let frames: Vec<Message> = server_rx.collect().await;
        let events = json_frames(&frames);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            json!({ "type": "error", "data": "live session dropped" })
        );
        assert_eq!(forwarded.recv().await, Some(LiveRequest::Close));
    }

    #[tokio::test]
    async fn test_malformed_control_message_is_dropped() {
        let (runner, mut forwarded) = FakeRunner::new(vec![], false);
        let relay = relay(runner, 8);
        let (client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, _server_rx) = mpsc::unbounded::<Message>();

        send_text(&client_tx, "{not json");
        send_text(&client_tx, r#"{"type":"unknown"}"#);
        send_text(&client_tx, r#"{"type":"text","data":"hello"}"#);
        drop(client_tx);

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        assert_eq!(
            forwarded.recv().await,
            Some(LiveRequest::Content("hello".to_string()))
        );
        assert_eq!(forwarded.recv().await, Some(LiveRequest::Close));
    }

    #[tokio::test]
    async fn test_session_resolution_failure_reports_error() {
        let (runner, _forwarded) = FakeRunner::new(vec![], false);
        let relay = relay(runner, 0);
        let (_client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let frames: Vec<Message> = server_rx.collect().await;
        let events = json_frames(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
        assert!(
            events[0]["data"]
                .as_str()
                .unwrap()
                .starts_with("Failed to create session")
        );
    }

    #[tokio::test]
    async fn test_agent_start_failure_reports_error() {
        let relay = relay(FakeRunner::failing(), 8);
        let (_client_tx, client_rx) = mpsc::unbounded();
        let (server_tx, server_rx) = mpsc::unbounded::<Message>();

        relay.handle(server_tx, client_rx, "s1".to_string()).await;

        let frames: Vec<Message> = server_rx.collect().await;
        let events = json_frames(&frames);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "error");
    }
}
