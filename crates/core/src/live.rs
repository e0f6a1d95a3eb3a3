//! Live agent runs backed by the Gemini Live API.
//!
//! Each run owns one Live WebSocket. A spawned pump task forwards queued
//! client input to the server, translates server content into
//! [`AgentEvent`]s, executes tool calls in the background and answers them
//! with tool responses. Finalized transcripts are appended to the session so a
//! reconnecting client resumes the same conversation.

use crate::{
    agent::{
        AgentEvent, AgentEventStream, AgentRunner, LiveRequest, LiveRequestReceiver, Tool,
        ToolContext,
    },
    session::{SessionHandle, Turn, TurnRole},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use gemini_realtime::{
    LiveReceiver, LiveSender,
    types::{
        AudioTranscriptionConfig, BidiGenerateContentSetup, ClientMessage, Content,
        FunctionCall, FunctionDeclaration, FunctionResponse, GenerationConfig, LiveServerContent, Part,
        ResponseModality, ServerMessage, ToolDeclaration,
    },
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Agent events buffered between the pump and the relay.
const EVENT_BUFFER_SIZE: usize = 64;

#[derive(Clone, Debug)]
pub struct LiveAgentConfig {
    pub api_key: String,
    pub model: String,
    pub system_instruction: String,
}

pub struct GeminiLiveAgent {
    config: LiveAgentConfig,
    tools: Vec<Arc<dyn Tool>>,
}

impl GeminiLiveAgent {
    pub fn new(config: LiveAgentConfig) -> Self {
        Self {
            config,
            tools: Vec::new(),
        }
    }

    /// Registers a tool the model may call.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    fn setup(&self) -> BidiGenerateContentSetup {
        let function_declarations: Vec<FunctionDeclaration> = self
            .tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        let tools = if function_declarations.is_empty() {
            vec![]
        } else {
            vec![ToolDeclaration {
                function_declarations,
            }]
        };

        let model = if self.config.model.starts_with("models/") {
            self.config.model.clone()
        } else {
            format!("models/{}", self.config.model)
        };

        BidiGenerateContentSetup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
            },
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: self.config.system_instruction.clone(),
                }],
            }),
            tools,
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: Some(AudioTranscriptionConfig::default()),
        }
    }
}

#[async_trait]
impl AgentRunner for GeminiLiveAgent {
    async fn run_live(
        &self,
        session: SessionHandle,
        requests: LiveRequestReceiver,
    ) -> Result<AgentEventStream> {
        let (mut sender, receiver) = gemini_realtime::connect(&self.config.api_key, self.setup())
            .await
            .context("Failed to open Gemini Live session")?;

        let history = session.history().await;
        if !history.is_empty() {
            let turns = history.iter().map(turn_to_content).collect();
            sender
                .send(&ClientMessage::history(turns))
                .await
                .context("Failed to replay session history")?;
            info!(session_id = %session.id(), turns = history.len(), "Replayed session history");
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let span = info_span!("gemini_live", session_id = %session.id());
        let run = LiveRun {
            session,
            tools: self.tools.clone(),
            events: events_tx,
            tracker: TurnTracker::default(),
        };
        tokio::spawn(run.pump(sender, receiver, requests).instrument(span));

        Ok(Box::pin(ReceiverStream::new(events_rx)))
    }
}

fn turn_to_content(turn: &Turn) -> Content {
    let role = match turn.role {
        TurnRole::User => "user",
        TurnRole::Model => "model",
    };
    Content::text(role, turn.text.clone())
}

struct LiveRun {
    session: SessionHandle,
    tools: Vec<Arc<dyn Tool>>,
    events: mpsc::Sender<Result<AgentEvent>>,
    tracker: TurnTracker,
}

impl LiveRun {
    async fn pump(
        mut self,
        mut sender: LiveSender,
        mut receiver: LiveReceiver,
        mut requests: LiveRequestReceiver,
    ) {
        let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<FunctionResponse>();

        loop {
            let outgoing = tokio::select! {
                request = requests.recv() => {
                    match request {
                        Some(LiveRequest::Realtime(blob)) => ClientMessage::audio(&blob.data, &blob.mime_type),
                        Some(LiveRequest::Content(text)) => {
                            self.session.record_turn(TurnRole::User, &text).await;
                            ClientMessage::user_text(text)
                        }
                        Some(LiveRequest::ActivityEnd) => ClientMessage::audio_stream_end(),
                        Some(LiveRequest::Close) | None => {
                            debug!("Live request queue closed.");
                            break;
                        }
                    }
                },
                Some(response) = tool_rx.recv() => ClientMessage::tool_response(vec![response]),
                message = receiver.next_message() => {
                    match message {
                        Some(Ok(msg)) => {
                            if !self.handle_server_message(msg, &tool_tx).await {
                                break;
                            }
                            continue;
                        }
                        Some(Err(e)) => {
                            error!(error = ?e, "Error reading from Gemini Live.");
                            let _ = self.events.send(Err(e)).await;
                            break;
                        }
                        None => {
                            info!("Gemini Live stream ended.");
                            break;
                        }
                    }
                },
            };

            if let Err(e) = sender.send(&outgoing).await {
                error!(error = ?e, "Failed to send to Gemini Live.");
                let _ = self.events.send(Err(e)).await;
                break;
            }
        }

        let _ = sender.close().await;
        debug!("Live run finished.");
    }

    /// Returns `false` once nobody is consuming events any more.
    async fn handle_server_message(
        &mut self,
        msg: ServerMessage,
        tool_tx: &mpsc::UnboundedSender<FunctionResponse>,
    ) -> bool {
        if let Some(content) = msg.server_content {
            let (events, turns) = self.tracker.on_content(content);
            for turn in turns {
                self.session.record_turn(turn.role, &turn.text).await;
            }
            for event in events {
                if self.events.send(Ok(event)).await.is_err() {
                    debug!("Agent event consumer dropped.");
                    return false;
                }
            }
        }
        if let Some(tool_call) = msg.tool_call {
            for call in tool_call.function_calls {
                self.dispatch_tool(call, tool_tx.clone());
            }
        }
        if let Some(cancellation) = msg.tool_call_cancellation {
            debug!(ids = ?cancellation.ids, "Ignoring tool call cancellation.");
        }
        if let Some(go_away) = msg.go_away {
            warn!(time_left = ?go_away.time_left, "Gemini Live server is going away.");
        }
        true
    }

    /// Runs the tool in the background so audio keeps flowing while it works.
    fn dispatch_tool(&self, call: FunctionCall, tool_tx: mpsc::UnboundedSender<FunctionResponse>) {
        let FunctionCall { id, name, args } = call;
        let Some(tool) = self.tools.iter().find(|t| t.name() == name).cloned() else {
            warn!(tool = %name, "Model called an unknown tool.");
            let _ = tool_tx.send(FunctionResponse {
                id,
                response: json!({ "status": "error", "message": format!("Unknown tool: {}", name) }),
                name,
            });
            return;
        };

        let ctx = ToolContext {
            session_id: self.session.id().to_string(),
        };
        info!(tool = %name, "Executing tool call.");
        tokio::spawn(
            async move {
                let response = tool.call(args, &ctx).await;
                let _ = tool_tx.send(FunctionResponse { id, name, response });
            }
            .in_current_span(),
        );
    }
}

/// Accumulates transcript deltas into finalized turns.
#[derive(Default)]
struct TurnTracker {
    input: String,
    output: String,
}

impl TurnTracker {
    /// Converts one `serverContent` message into agent events, returning any
    /// turns it finalized.
    fn on_content(&mut self, content: LiveServerContent) -> (Vec<AgentEvent>, Vec<Turn>) {
        let mut events = Vec::new();
        let mut turns = Vec::new();

        if let Some(transcription) = content.input_transcription {
            if !transcription.text.is_empty() {
                self.input.push_str(&transcription.text);
                events.push(AgentEvent::input_transcription(transcription.text, true));
            }
        }

        // The user's utterance is over once the model answers.
        let model_output = content.model_turn.is_some() || content.output_transcription.is_some();
        if model_output || content.turn_complete {
            self.finish_input(&mut events, &mut turns);
        }

        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if part.thought {
                    debug!("Dropping thought part.");
                    continue;
                }
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/") {
                        match blob.decode() {
                            Ok(pcm) => events.push(AgentEvent::audio(pcm)),
                            Err(e) => warn!(error = %e, "Dropping undecodable audio part."),
                        }
                    }
                    continue;
                }
                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                    events.push(AgentEvent::text(text));
                }
            }
        }

        if let Some(transcription) = content.output_transcription {
            if !transcription.text.is_empty() {
                self.output.push_str(&transcription.text);
                events.push(AgentEvent::output_transcription(transcription.text, true));
            }
        }

        if content.interrupted {
            debug!("Model output interrupted by the user.");
        }
        if content.turn_complete || content.interrupted {
            let text = std::mem::take(&mut self.output);
            if !text.trim().is_empty() {
                turns.push(Turn {
                    role: TurnRole::Model,
                    text: text.trim().to_string(),
                });
            }
        }

        (events, turns)
    }

    fn finish_input(&mut self, events: &mut Vec<AgentEvent>, turns: &mut Vec<Turn>) {
        let text = std::mem::take(&mut self.input);
        if text.trim().is_empty() {
            return;
        }
        events.push(AgentEvent::input_transcription(text.clone(), false));
        turns.push(Turn {
            role: TurnRole::User,
            text: text.trim().to_string(),
        });
    }
}
