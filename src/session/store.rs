//! Session store: owns every session and the active-session key.
//!
//! Sessions live in a single map keyed by id; `order` only records the
//! collection order (newest first) and `active` is just a selected key. The
//! active view is always a lookup into the map, so it cannot diverge from its
//! collection entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::AssistantCatalog;
use crate::error::ChatError;

use super::model::{ChatMessage, ChatSession, ModelType, ReplyState};

/// Outcome of [`SessionStore::select_assistant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// The session that is now active.
    pub session_id: Uuid,
    /// Whether the session was created by this selection.
    pub created: bool,
}

/// Outcome of [`SessionStore::delete_session`].
#[derive(Debug, Clone)]
pub struct Deletion {
    /// The removed session.
    pub session: ChatSession,
    /// Whether the removed session was the active one.
    pub was_active: bool,
    /// The active session after deletion.
    pub active: Option<Uuid>,
}

/// Owns sessions, their collection order, and the active-session pointer.
#[derive(Debug)]
pub struct SessionStore {
    catalog: Arc<AssistantCatalog>,
    sessions: HashMap<Uuid, ChatSession>,
    /// Collection order, head first.
    order: VecDeque<Uuid>,
    active: Option<Uuid>,
    next_seq: u64,
}

impl SessionStore {
    /// Create an empty store resolving assistants against `catalog`.
    pub fn new(catalog: Arc<AssistantCatalog>) -> Self {
        Self {
            catalog,
            sessions: HashMap::new(),
            order: VecDeque::new(),
            active: None,
            next_seq: 0,
        }
    }

    pub fn catalog(&self) -> &Arc<AssistantCatalog> {
        &self.catalog
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Create a session seeded with the assistant's greeting, insert it at the
    /// head of the collection and make it active.
    pub fn create_session(
        &mut self,
        assistant_id: &str,
        model_type: ModelType,
    ) -> Result<Uuid, ChatError> {
        let catalog = Arc::clone(&self.catalog);
        let Some(assistant) = catalog.get(assistant_id) else {
            warn!(assistant_id, "Cannot create session for unknown assistant");
            return Err(ChatError::AssistantNotFound {
                id: assistant_id.to_string(),
            });
        };

        let seq = self.take_seq();
        let session = ChatSession::new(assistant, model_type, seq);
        let id = session.id;

        self.sessions.insert(id, session);
        self.order.push_front(id);
        self.active = Some(id);

        info!(session_id = %id, assistant_id, model = %model_type, "Session created");
        Ok(id)
    }

    /// Activate a session for `assistant_id`, creating one if none exists.
    ///
    /// With several sessions for the same assistant, the most recently updated
    /// one wins; equal timestamps are settled by the newest message sequence.
    pub fn select_assistant(
        &mut self,
        assistant_id: &str,
        model_type: ModelType,
    ) -> Result<Selection, ChatError> {
        if !self.catalog.contains(assistant_id) {
            warn!(assistant_id, "Cannot select unknown assistant");
            return Err(ChatError::AssistantNotFound {
                id: assistant_id.to_string(),
            });
        }

        match self.latest_for_assistant(assistant_id) {
            Some(session_id) => {
                self.active = Some(session_id);
                debug!(session_id = %session_id, assistant_id, "Existing session selected");
                Ok(Selection {
                    session_id,
                    created: false,
                })
            }
            None => {
                let session_id = self.create_session(assistant_id, model_type)?;
                Ok(Selection {
                    session_id,
                    created: true,
                })
            }
        }
    }

    /// Make `id` the active session.
    pub fn select_session(&mut self, id: Uuid) -> Result<(), ChatError> {
        if !self.sessions.contains_key(&id) {
            warn!(session_id = %id, "Cannot select unknown session");
            return Err(ChatError::SessionNotFound { id });
        }
        self.active = Some(id);
        debug!(session_id = %id, "Session selected");
        Ok(())
    }

    /// Remove a session. If it was active, the new collection head becomes
    /// active (or nothing, when the collection is empty).
    pub fn delete_session(&mut self, id: Uuid) -> Result<Deletion, ChatError> {
        let Some(session) = self.sessions.remove(&id) else {
            warn!(session_id = %id, "Cannot delete unknown session");
            return Err(ChatError::SessionNotFound { id });
        };
        self.order.retain(|s| *s != id);

        let was_active = self.active == Some(id);
        if was_active {
            self.active = self.order.front().copied();
        }

        info!(session_id = %id, new_active = ?self.active, "Session deleted");
        Ok(Deletion {
            session,
            was_active,
            active: self.active,
        })
    }

    /// Reset a session's log to a fresh greeting. Rejected while a reply is
    /// in flight.
    pub fn clear_messages(&mut self, id: Uuid) -> Result<(), ChatError> {
        let catalog = Arc::clone(&self.catalog);
        let seq = self.next_seq;
        let Some(session) = self.sessions.get_mut(&id) else {
            warn!(session_id = %id, "Cannot clear unknown session");
            return Err(ChatError::SessionNotFound { id });
        };
        if session.is_pending() {
            return Err(ChatError::ReplyPending { session_id: id });
        }
        let assistant = catalog
            .get(&session.assistant_id)
            .ok_or_else(|| ChatError::AssistantNotFound {
                id: session.assistant_id.clone(),
            })?;

        let fresh = ChatSession::new(assistant, session.model_type, seq);
        let greeting = fresh.messages[0].clone();
        session.messages.clear();
        session.title = fresh.title;
        session.push(greeting);
        self.next_seq += 1;

        debug!(session_id = %id, "Session history cleared");
        Ok(())
    }

    /// Set a session's reply model.
    pub fn set_model(&mut self, id: Uuid, model_type: ModelType) -> Result<(), ChatError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ChatError::SessionNotFound { id })?;
        session.model_type = model_type;
        Ok(())
    }

    /// Append a message built from the next sequence number.
    pub(crate) fn append(
        &mut self,
        id: Uuid,
        build: impl FnOnce(u64) -> ChatMessage,
    ) -> Result<&ChatMessage, ChatError> {
        if !self.sessions.contains_key(&id) {
            return Err(ChatError::SessionNotFound { id });
        }
        let message = build(self.take_seq());
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ChatError::SessionNotFound { id })?;
        session.push(message);
        session
            .messages
            .last()
            .ok_or(ChatError::SessionNotFound { id })
    }

    /// Replace a session's reply state.
    pub(crate) fn set_reply_state(&mut self, id: Uuid, state: ReplyState) -> Result<(), ChatError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ChatError::SessionNotFound { id })?;
        session.reply_state = state;
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// The active session, if any.
    pub fn active(&self) -> Option<&ChatSession> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn get(&self, id: Uuid) -> Option<&ChatSession> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions.contains_key(&id)
    }

    /// All sessions in collection order, head first.
    pub fn list(&self) -> Vec<&ChatSession> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }

    /// Sessions bound to `assistant_id`, in collection order.
    pub fn sessions_for_assistant(&self, assistant_id: &str) -> Vec<&ChatSession> {
        self.list()
            .into_iter()
            .filter(|s| s.assistant_id == assistant_id)
            .collect()
    }

    /// Sessions with a reply in flight.
    pub fn pending_sessions(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .filter(|id| self.sessions.get(id).is_some_and(|s| s.is_pending()))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn latest_for_assistant(&self, assistant_id: &str) -> Option<Uuid> {
        self.sessions_for_assistant(assistant_id)
            .into_iter()
            .max_by_key(|s| (s.updated_at, s.last_message().map(|m| m.seq)))
            .map(|s| s.id)
    }
}
