//! Encyclopedia API Library Crate
//!
//! This library contains the web service around the encyclopedia core:
//! configuration, application state, REST handlers, the WebSocket voice relay
//! and content channel, and routing. The binaries are thin wrappers around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
mod test_support;
