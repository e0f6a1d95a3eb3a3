//! WebSocket client for the Gemini Live API.

use crate::types::{BidiGenerateContentSetup, ClientMessage, ServerMessage};
use anyhow::{Context, Result, anyhow};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

pub const LIVE_API_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

type LiveStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The write half of an established Live session.
pub struct LiveSender {
    inner: SplitSink<LiveStream, WsMessage>,
}

impl LiveSender {
    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(msg)?;
        self.inner.send(WsMessage::Text(payload.into())).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// The read half of an established Live session.
pub struct LiveReceiver {
    inner: SplitStream<LiveStream>,
}

impl LiveReceiver {
    /// Waits for the next decodable server message.
    ///
    /// Returns `None` once the server closes the connection. Frames that are
    /// not valid JSON are logged and skipped.
    pub async fn next_message(&mut self) -> Option<Result<ServerMessage>> {
        loop {
            let payload = match self.inner.next().await? {
                Ok(WsMessage::Text(text)) => text.as_bytes().to_vec(),
                Ok(WsMessage::Binary(data)) => data.to_vec(),
                Ok(WsMessage::Close(close_frame)) => {
                    info!(?close_frame, "Gemini Live connection closed by server.");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            };
            match serde_json::from_slice::<ServerMessage>(&payload) {
                Ok(msg) => return Some(Ok(msg)),
                Err(e) => {
                    warn!(error = %e, bytes = payload.len(), "Skipping undecodable Gemini message.");
                }
            }
        }
    }
}

/// Installs the process-wide rustls crypto provider (`ring`).
///
/// Safe to call repeatedly; only the first call has an effect.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok()
    {
        debug!("Installed ring as the rustls crypto provider.");
    }
}

/// Connects to the Live API, sends `setup` and waits for `setupComplete`.
///
/// The returned halves are ready for bidirectional streaming.
pub async fn connect(
    api_key: &str,
    setup: BidiGenerateContentSetup,
) -> Result<(LiveSender, LiveReceiver)> {
    connect_to(LIVE_API_URL, api_key, setup).await
}

async fn connect_to(
    endpoint: &str,
    api_key: &str,
    setup: BidiGenerateContentSetup,
) -> Result<(LiveSender, LiveReceiver)> {
    install_crypto_provider();

    let url = format!("{}?key={}", endpoint, api_key);
    let (ws_stream, _) = connect_async(url)
        .await
        .context("Failed to connect to Gemini Live WebSocket")?;
    info!(model = %setup.model, "Connected to Gemini Live WebSocket.");

    let (sink, stream) = ws_stream.split();
    let mut sender = LiveSender { inner: sink };
    let mut receiver = LiveReceiver { inner: stream };

    sender.send(&ClientMessage::Setup(setup)).await?;

    while let Some(msg) = receiver.next_message().await {
        let msg = msg?;
        if msg.setup_complete.is_some() {
            debug!("Gemini session setup is complete.");
            return Ok((sender, receiver));
        }
        error!("Received unexpected message during Gemini setup: {:?}", msg);
    }
    Err(anyhow!("Gemini Live connection closed before setup completed"))
}
