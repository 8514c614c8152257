//! Reply orchestrator: drives one send from the user message to the final
//! assistant reply.
//!
//! Each accepted send runs as its own tokio task bound to the session id
//! captured at acceptance. Every delayed step re-checks, under the store's
//! write lock, that the session still exists, that its reply state still
//! belongs to this request, and that the request was not cancelled. A failed
//! check makes the step a silent no-op.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ChatConfig, PendingPolicy};
use crate::error::{ChatError, LlmError};
use crate::events::{ChatEvent, EventBus};
use crate::session::{ChatMessage, ReplyState, SessionStore};

use super::generator::{ReplyGenerator, ReplyRequest};
use super::state::{ReplyPhase, ReplyTicket};

/// Text of the visible message that replaces a failed reply.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Sorry, I couldn't come up with a reply just now. Please try again.";

/// Returned when a send is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Session the reply will land in.
    pub session_id: Uuid,
    /// Identifies this send in events and cancellation.
    pub request_id: Uuid,
    /// The user message that was appended.
    pub user_message: ChatMessage,
}

/// An in-flight send.
struct InFlight {
    ticket: ReplyTicket,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Runs the asynchronous reply pipeline against a shared [`SessionStore`].
#[derive(Clone)]
pub struct ReplyOrchestrator {
    store: Arc<RwLock<SessionStore>>,
    generator: Arc<dyn ReplyGenerator>,
    config: ChatConfig,
    events: EventBus,
    /// In-flight sends keyed by target session id.
    in_flight: Arc<Mutex<HashMap<Uuid, InFlight>>>,
}

impl ReplyOrchestrator {
    pub fn new(
        store: Arc<RwLock<SessionStore>>,
        generator: Arc<dyn ReplyGenerator>,
        config: ChatConfig,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            generator,
            config,
            events,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a user message to the active session and start generating the
    /// reply in the background.
    ///
    /// Rejected synchronously when the message is blank, there is no active
    /// session, or a conflicting reply is pending under the configured policy.
    pub async fn send_message(&self, content: &str) -> Result<SendReceipt, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let mut store = self.store.write().await;
        let Some(session_id) = store.active_id() else {
            warn!("Cannot send without an active session");
            return Err(ChatError::NoActiveSession);
        };
        self.check_pending(&store, session_id)?;

        let mut ticket = ReplyTicket::new(session_id);
        let request_id = ticket.request_id;
        let user_message = store
            .append(session_id, |seq| ChatMessage::user(content, seq))?
            .clone();
        if let Err(e) = ticket.transition_to(ReplyPhase::UserAppended) {
            warn!(session_id = %session_id, request_id = %request_id, "{}", e);
        }
        store.set_reply_state(
            session_id,
            ReplyState::Pending {
                request_id,
                since: user_message.timestamp,
            },
        )?;
        self.events.publish(ChatEvent::MessageAppended {
            session_id,
            message: user_message.clone(),
        });

        // Registered before the store lock is released so cancellation and
        // deletion always find the entry.
        let mut in_flight = self.in_flight.lock().await;
        drop(store);

        let cancel = CancellationToken::new();
        let this = self.clone();
        let task_cancel = cancel.clone();
        in_flight.insert(
            session_id,
            InFlight {
                ticket,
                cancel,
                handle: None,
            },
        );
        let handle = tokio::spawn(async move {
            this.run_pipeline(session_id, request_id, task_cancel).await;
        });
        if let Some(entry) = in_flight.get_mut(&session_id) {
            if entry.ticket.request_id == request_id {
                entry.handle = Some(handle);
            }
        }
        drop(in_flight);

        info!(session_id = %session_id, request_id = %request_id, "Message accepted");
        Ok(SendReceipt {
            session_id,
            request_id,
            user_message,
        })
    }

    fn check_pending(&self, store: &SessionStore, session_id: Uuid) -> Result<(), ChatError> {
        match self.config.pending_policy {
            PendingPolicy::PerSession => {
                if store.get(session_id).is_some_and(|s| s.is_pending()) {
                    warn!(session_id = %session_id, "Reply already pending for session");
                    return Err(ChatError::ReplyPending { session_id });
                }
            }
            PendingPolicy::Global => {
                if let Some(pending) = store.pending_sessions().first().copied() {
                    warn!(session_id = %pending, "Reply already pending elsewhere");
                    return Err(ChatError::ReplyPending {
                        session_id: pending,
                    });
                }
            }
        }
        Ok(())
    }

    /// Steps 2 and 3 of a send.
    async fn run_pipeline(&self, session_id: Uuid, request_id: Uuid, cancel: CancellationToken) {
        // Step 2: show the thinking placeholder.
        if !sleep_unless_cancelled(&cancel, self.config.thinking_delay).await {
            return self.finish(session_id, request_id).await;
        }
        {
            let mut store = self.store.write().await;
            if !owns(&store, session_id, request_id, &cancel) {
                drop(store);
                debug!(
                    session_id = %session_id,
                    request_id = %request_id,
                    "Thinking step suppressed"
                );
                return self.finish(session_id, request_id).await;
            }
            let _ = store.set_reply_state(
                session_id,
                ReplyState::Thinking {
                    request_id,
                    since: chrono::Utc::now(),
                },
            );
        }
        self.advance(session_id, request_id, ReplyPhase::ThinkingShown)
            .await;
        self.events.publish(ChatEvent::ThinkingStarted {
            session_id,
            request_id,
        });

        // Step 3: generate and resolve.
        if !sleep_unless_cancelled(&cancel, self.config.reply_delay).await {
            return self.finish(session_id, request_id).await;
        }
        let request = {
            let store = self.store.read().await;
            if !owns(&store, session_id, request_id, &cancel) {
                drop(store);
                return self.finish(session_id, request_id).await;
            }
            match build_request(&store, session_id) {
                Some(request) => request,
                None => {
                    drop(store);
                    return self.finish(session_id, request_id).await;
                }
            }
        };

        // A panicking generator is reported like any other generation failure.
        let generation = AssertUnwindSafe(self.generator.generate(&request)).catch_unwind();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                return self.finish(session_id, request_id).await;
            }
            result = tokio::time::timeout(self.config.generation_timeout, generation) => {
                match result {
                    Ok(Ok(inner)) => inner,
                    Ok(Err(panic)) => Err(LlmError::RequestFailed {
                        provider: self.generator.name().to_string(),
                        reason: format!("generator panicked: {}", panic_message(&*panic)),
                    }),
                    Err(_) => Err(LlmError::Timeout {
                        timeout: self.config.generation_timeout,
                    }),
                }
            }
        };

        let event = {
            let mut store = self.store.write().await;
            if !owns(&store, session_id, request_id, &cancel) {
                drop(store);
                debug!(session_id = %session_id, request_id = %request_id, "Reply discarded");
                return self.finish(session_id, request_id).await;
            }

            let (message, error) = match outcome {
                Ok(content) => (
                    store
                        .append(session_id, |seq| ChatMessage::assistant(content, seq))
                        .cloned(),
                    None,
                ),
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        generator = self.generator.name(),
                        error = %e,
                        "Reply generation failed"
                    );
                    (
                        store
                            .append(session_id, |seq| {
                                ChatMessage::error(GENERATION_FAILED_MESSAGE, seq)
                            })
                            .cloned(),
                        Some(e.to_string()),
                    )
                }
            };
            let _ = store.set_reply_state(session_id, ReplyState::Idle);

            match (message, error) {
                (Ok(message), None) => ChatEvent::ReplyResolved {
                    session_id,
                    request_id,
                    message,
                },
                (Ok(message), Some(error)) => ChatEvent::ReplyFailed {
                    session_id,
                    request_id,
                    message,
                    error,
                },
                (Err(_), _) => {
                    drop(store);
                    return self.finish(session_id, request_id).await;
                }
            }
        };

        let phase = match event {
            ChatEvent::ReplyFailed { .. } => ReplyPhase::Failed,
            _ => ReplyPhase::Resolved,
        };
        self.advance(session_id, request_id, phase).await;
        info!(session_id = %session_id, request_id = %request_id, phase = %phase, "Reply finished");
        self.events.publish(event);
        self.finish(session_id, request_id).await;
    }

    /// Record a phase change on the in-flight ticket.
    async fn advance(&self, session_id: Uuid, request_id: Uuid, phase: ReplyPhase) {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(entry) = in_flight.get_mut(&session_id) {
            if entry.ticket.request_id != request_id {
                return;
            }
            if let Err(e) = entry.ticket.transition_to(phase) {
                warn!(session_id = %session_id, request_id = %request_id, "{}", e);
            }
        }
    }

    /// Drop the in-flight entry if it still belongs to `request_id`.
    async fn finish(&self, session_id: Uuid, request_id: Uuid) {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(&session_id)
            .is_some_and(|e| e.ticket.request_id == request_id)
        {
            in_flight.remove(&session_id);
        }
    }

    /// Cancel the reply pending for `session_id`. The user message stays; the
    /// placeholder is cleared and no reply is appended.
    ///
    /// Returns `false` when nothing was pending.
    pub async fn cancel_reply(&self, session_id: Uuid) -> Result<bool, ChatError> {
        let mut store = self.store.write().await;
        let Some(session) = store.get(session_id) else {
            warn!(session_id = %session_id, "Cannot cancel reply for unknown session");
            return Err(ChatError::SessionNotFound { id: session_id });
        };
        let Some(request_id) = session.reply_state.request_id() else {
            return Ok(false);
        };
        store.set_reply_state(session_id, ReplyState::Idle)?;
        drop(store);

        // A send accepted after the lock was released owns a new entry; leave it.
        self.cancel_entry(session_id, Some(request_id)).await;
        info!(session_id = %session_id, request_id = %request_id, "Reply cancelled");
        self.events.publish(ChatEvent::ReplyCancelled {
            session_id,
            request_id,
        });
        Ok(true)
    }

    /// Cancel whatever is in flight for a session that is being deleted.
    /// The caller removes the session itself.
    pub async fn forget_session(&self, session_id: Uuid) {
        if self.cancel_entry(session_id, None).await {
            debug!(session_id = %session_id, "In-flight reply cancelled for deleted session");
        }
    }

    /// Cancel the entry for `session_id`, restricted to `request_id` when given.
    async fn cancel_entry(&self, session_id: Uuid, request_id: Option<Uuid>) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        let matches = in_flight
            .get(&session_id)
            .is_some_and(|e| request_id.is_none_or(|id| e.ticket.request_id == id));
        if !matches {
            return false;
        }
        match in_flight.remove(&session_id) {
            Some(mut entry) => {
                let _ = entry.ticket.transition_to(ReplyPhase::Cancelled);
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a reply is pending for `session_id`.
    pub async fn is_pending(&self, session_id: Uuid) -> bool {
        self.store
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| s.is_pending())
    }

    /// Snapshot of every in-flight send.
    pub async fn in_flight(&self) -> Vec<ReplyTicket> {
        self.in_flight
            .lock()
            .await
            .values()
            .map(|e| e.ticket.clone())
            .collect()
    }

    /// Wait until no send is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<(Uuid, Uuid, JoinHandle<()>)> = {
                let mut in_flight = self.in_flight.lock().await;
                in_flight
                    .iter_mut()
                    .filter_map(|(session_id, e)| {
                        e.handle
                            .take()
                            .map(|h| (*session_id, e.ticket.request_id, h))
                    })
                    .collect()
            };
            if handles.is_empty() {
                if self.in_flight.lock().await.is_empty() {
                    return;
                }
                tokio::task::yield_now().await;
                continue;
            }
            for (session_id, request_id, handle) in handles {
                if let Err(e) = handle.await {
                    self.abandon(session_id, request_id, &e.to_string()).await;
                }
            }
        }
    }

    /// Clean up after a pipeline task that died without finishing.
    async fn abandon(&self, session_id: Uuid, request_id: Uuid, reason: &str) {
        warn!(session_id = %session_id, request_id = %request_id, reason, "Reply task aborted");
        {
            let mut store = self.store.write().await;
            let owned = store
                .get(session_id)
                .is_some_and(|s| s.reply_state.request_id() == Some(request_id));
            if owned {
                let _ = store.set_reply_state(session_id, ReplyState::Idle);
            }
        }
        self.finish(session_id, request_id).await;
    }

    /// Cancel every in-flight send and reset their sessions to idle.
    pub async fn shutdown(&self) {
        let entries: Vec<(Uuid, Uuid)> = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .drain()
                .map(|(session_id, e)| {
                    e.cancel.cancel();
                    (session_id, e.ticket.request_id)
                })
                .collect()
        };

        let mut store = self.store.write().await;
        for (session_id, request_id) in &entries {
            let owned = store
                .get(*session_id)
                .is_some_and(|s| s.reply_state.request_id() == Some(*request_id));
            if owned {
                let _ = store.set_reply_state(*session_id, ReplyState::Idle);
            }
        }
        drop(store);

        for (session_id, request_id) in entries {
            self.events.publish(ChatEvent::ReplyCancelled {
                session_id,
                request_id,
            });
        }
        info!("Reply orchestrator shut down");
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn sleep_unless_cancelled(cancel: &CancellationToken, delay: std::time::Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// The session exists, its reply state belongs to `request_id`, and the send
/// was not cancelled.
fn owns(
    store: &SessionStore,
    session_id: Uuid,
    request_id: Uuid,
    cancel: &CancellationToken,
) -> bool {
    !cancel.is_cancelled()
        && store
            .get(session_id)
            .is_some_and(|s| s.reply_state.request_id() == Some(request_id))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn build_request(store: &SessionStore, session_id: Uuid) -> Option<ReplyRequest> {
    let session = store.get(session_id)?;
    let assistant = store.catalog().get(&session.assistant_id)?.clone();
    Some(ReplyRequest {
        session_id,
        assistant,
        model_type: session.model_type,
        history: session.messages.clone(),
    })
}
