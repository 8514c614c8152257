//! Reply phase state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Progress of one outstanding send.
///
/// Idle → UserAppended → ThinkingShown → Resolved, with Failed and Cancelled
/// as the other terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPhase {
    Idle,
    UserAppended,
    ThinkingShown,
    Resolved,
    Failed,
    Cancelled,
}

impl ReplyPhase {
    /// Check if this phase allows transitioning to another phase.
    pub fn can_transition_to(&self, target: ReplyPhase) -> bool {
        use ReplyPhase::*;

        matches!(
            (self, target),
            (Idle, UserAppended) |
            (UserAppended, ThinkingShown) | (UserAppended, Cancelled) |
            (ThinkingShown, Resolved) | (ThinkingShown, Failed) | (ThinkingShown, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ReplyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::UserAppended => "user_appended",
            Self::ThinkingShown => "thinking_shown",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Tracks one send from acceptance to a terminal phase.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyTicket {
    /// Unique request ID.
    pub request_id: Uuid,
    /// Session captured when the send was accepted.
    pub session_id: Uuid,
    /// Current phase.
    pub phase: ReplyPhase,
    /// When the send was accepted.
    pub accepted_at: DateTime<Utc>,
    /// When the current phase was entered.
    pub phase_since: DateTime<Utc>,
}

impl ReplyTicket {
    /// A ticket for a send that has not touched the session yet.
    pub fn new(session_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            request_id: Uuid::new_v4(),
            session_id,
            phase: ReplyPhase::Idle,
            accepted_at: now,
            phase_since: now,
        }
    }

    /// Move to `target`, rejecting transitions the state machine does not allow.
    pub fn transition_to(&mut self, target: ReplyPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(target) {
            return Err(format!("Cannot transition from {} to {}", self.phase, target));
        }
        self.phase = target;
        self.phase_since = Utc::now();
        Ok(())
    }
}
