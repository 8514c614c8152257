//! Engine events: broadcast to UI hosts as state changes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::{ChatMessage, ModelType};

/// A state change observable by UI hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    SessionCreated {
        session_id: Uuid,
        assistant_id: String,
    },
    SessionDeleted {
        session_id: Uuid,
    },
    /// The active session changed (or became none).
    ActiveChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
    },
    MessageAppended {
        session_id: Uuid,
        message: ChatMessage,
    },
    ThinkingStarted {
        session_id: Uuid,
        request_id: Uuid,
    },
    ReplyResolved {
        session_id: Uuid,
        request_id: Uuid,
        message: ChatMessage,
    },
    /// Generation failed; `message` is the visible error appended in its place.
    ReplyFailed {
        session_id: Uuid,
        request_id: Uuid,
        message: ChatMessage,
        error: String,
    },
    ReplyCancelled {
        session_id: Uuid,
        request_id: Uuid,
    },
    ModelChanged {
        session_id: Uuid,
        model_type: ModelType,
    },
    FavoritesChanged {
        favorites: Vec<String>,
    },
    RecentsChanged {
        recents: Vec<String>,
    },
}

impl ChatEvent {
    /// The session this event concerns, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::SessionDeleted { session_id }
            | Self::MessageAppended { session_id, .. }
            | Self::ThinkingStarted { session_id, .. }
            | Self::ReplyResolved { session_id, .. }
            | Self::ReplyFailed { session_id, .. }
            | Self::ReplyCancelled { session_id, .. }
            | Self::ModelChanged { session_id, .. } => Some(*session_id),
            Self::ActiveChanged { session_id } => *session_id,
            Self::FavoritesChanged { .. } | Self::RecentsChanged { .. } => None,
        }
    }
}

/// Fan-out of [`ChatEvent`]s. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: ChatEvent) {
        let _ = self.tx.send(event);
    }
}
