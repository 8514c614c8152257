//! Persona Chat: chat-session orchestration engine.

pub mod affinity;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod preferences;
pub mod reply;
pub mod session;

pub use engine::{ChatEngine, EngineSnapshot, SessionView};
pub use error::{ChatError, Error, Result};
