//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session
//! registry, the content store and the service clients shared by every
//! handler.

use crate::config::Config;
use encyclopedia_core::{
    agent::AgentRunner, content_store::ContentStore, generator::ContentGenerator,
    session::SessionService, video::VideoGenerator,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionService>,
    pub agent: Arc<dyn AgentRunner>,
    pub content_store: Arc<ContentStore>,
    pub generator: Arc<dyn ContentGenerator>,
    pub video: Arc<dyn VideoGenerator>,
}
