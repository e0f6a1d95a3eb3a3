//! WebSocket Endpoints
//!
//! - `protocol`: the JSON frames exchanged with the browser.
//! - `relay`: the duplex voice relay between a client and a live agent run.
//! - `content`: the downstream-only channel that delivers generated pages.

pub mod content;
pub mod protocol;
pub mod relay;

use crate::state::AppState;
use axum::{
    extract::{
        Path, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::StreamExt;
use relay::VoiceRelay;
use std::sync::Arc;

/// Upgrades to the voice channel for `session_id`.
pub async fn voice_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let relay = VoiceRelay::new(state.sessions.clone(), state.agent.clone());
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        relay.handle(sink, stream, session_id).await;
    })
}

/// Upgrades to the content channel for `session_id`.
pub async fn content_ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket: WebSocket| async move {
        let (sink, stream) = socket.split();
        content::stream_pages(&state.content_store, &session_id, sink, stream).await;
    })
}
