//! Reply-model preferences: the default for new sessions and per-session
//! overrides.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ChatError;
use crate::session::{ModelType, SessionStore};

/// Tracks the preferred model used by future sessions.
#[derive(Debug, Clone, Default)]
pub struct PreferenceTracker {
    preferred: ModelType,
}

impl PreferenceTracker {
    pub fn new(preferred: ModelType) -> Self {
        Self { preferred }
    }

    /// Model used by the next `create_session` that does not name one.
    pub fn preferred_model(&self) -> ModelType {
        self.preferred
    }

    /// Resolve an optional explicit model against the preference.
    pub fn resolve(&self, explicit: Option<ModelType>) -> ModelType {
        explicit.unwrap_or(self.preferred)
    }

    /// Change the default for future sessions. Existing sessions keep theirs.
    pub fn set_preferred_model(&mut self, model: ModelType) {
        debug!(from = %self.preferred, to = %model, "Preferred model changed");
        self.preferred = model;
    }

    /// Change the active session's model only. Returns the affected session.
    pub fn change_model(
        &self,
        store: &mut SessionStore,
        model: ModelType,
    ) -> Result<Uuid, ChatError> {
        let Some(id) = store.active_id() else {
            warn!(model = %model, "Cannot change model without an active session");
            return Err(ChatError::NoActiveSession);
        };
        store.set_model(id, model)?;
        debug!(session_id = %id, model = %model, "Session model changed");
        Ok(id)
    }
}
