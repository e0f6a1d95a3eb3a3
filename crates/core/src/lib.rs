//! Domain logic for the voice encyclopedia: live agent runtime, sessions,
//! page generation and the content fan-out between them.

pub mod agent;
pub mod content_store;
pub mod generator;
pub mod live;
pub mod page;
pub mod prompts;
pub mod reasoning;
pub mod session;
pub mod tools;
pub mod video;
