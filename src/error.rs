//! Error types for persona-chat.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by chat commands.
///
/// None of these leave partial state behind: a command that returns an error
/// has not mutated the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Session {id} not found")]
    SessionNotFound { id: Uuid },

    #[error("Assistant {id} not found")]
    AssistantNotFound { id: String },

    #[error("No active session")]
    NoActiveSession,

    #[error("A reply is already pending for session {session_id}")]
    ReplyPending { session_id: Uuid },
}

impl ChatError {
    /// Whether this is one of the not-found family (missing session, assistant
    /// or active session).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound { .. } | Self::AssistantNotFound { .. } | Self::NoActiveSession
        )
    }
}

/// Reply-generation errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Reply generation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Model {model} not available on provider {provider}")]
    ModelNotAvailable { provider: String, model: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
