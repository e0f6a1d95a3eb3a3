//! Minimal client for the Gemini Live bidirectional streaming API.
//!
//! `types` holds the JSON wire format, `client` the WebSocket plumbing that
//! performs the setup handshake and splits the connection into a sender and a
//! receiver.

pub mod client;
pub mod types;

pub use client::{LiveReceiver, LiveSender, connect, install_crypto_provider};
