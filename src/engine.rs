//! Chat engine: the injected entry point for every inbound command.
//!
//! Owns the session store, preference and affinity trackers, and the reply
//! orchestrator. Construct one per run (or per test) and share it by
//! reference; there is no global state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::info;
use uuid::Uuid;

use crate::affinity::AffinityTracker;
use crate::catalog::{Assistant, AssistantCatalog};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::events::{ChatEvent, EventBus};
use crate::preferences::PreferenceTracker;
use crate::reply::{
    ReplyGenerator, ReplyOrchestrator, ReplyTicket, SendReceipt, TemplateReplyGenerator,
};
use crate::session::{ChatMessage, ChatSession, ModelType, Selection, SessionStore};

/// A session as the UI shows it: the stored log plus the thinking
/// placeholder while a reply is being generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub assistant_id: String,
    pub model_type: ModelType,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pending: bool,
}

impl From<&ChatSession> for SessionView {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id,
            assistant_id: session.assistant_id.clone(),
            model_type: session.model_type,
            title: session.title.clone(),
            messages: session.display_messages(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            pending: session.is_pending(),
        }
    }
}

/// Point-in-time view of the whole engine for UI hosts.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    /// Sessions in collection order, head first.
    pub sessions: Vec<SessionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_session_id: Option<Uuid>,
    pub favorites: Vec<String>,
    pub recents: Vec<String>,
    pub preferred_model: ModelType,
}

/// The chat-session orchestration engine.
pub struct ChatEngine {
    config: ChatConfig,
    catalog: Arc<AssistantCatalog>,
    store: Arc<RwLock<SessionStore>>,
    preferences: RwLock<PreferenceTracker>,
    affinity: RwLock<AffinityTracker>,
    orchestrator: ReplyOrchestrator,
    events: EventBus,
}

impl ChatEngine {
    /// Create an engine over `catalog`, generating replies with `generator`.
    pub fn new(
        config: ChatConfig,
        catalog: Arc<AssistantCatalog>,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        let store = Arc::new(RwLock::new(SessionStore::new(Arc::clone(&catalog))));
        let orchestrator = ReplyOrchestrator::new(
            Arc::clone(&store),
            generator,
            config.clone(),
            events.clone(),
        );

        Self {
            preferences: RwLock::new(PreferenceTracker::new(config.default_model)),
            affinity: RwLock::new(AffinityTracker::new(config.recents_capacity)),
            config,
            catalog,
            store,
            orchestrator,
            events,
        }
    }

    /// Built-in personas and the template generator, configured from
    /// `PERSONA_CHAT_*` environment variables.
    pub fn from_env() -> crate::error::Result<Self> {
        let config = ChatConfig::try_from_env()?;
        info!(
            pending_policy = %config.pending_policy,
            default_model = %config.default_model,
            "Chat engine configured"
        );
        Ok(Self::with_defaults(config))
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Built-in personas with the template generator.
    pub fn with_defaults(config: ChatConfig) -> Self {
        Self::new(
            config,
            Arc::new(AssistantCatalog::builtin()),
            Arc::new(TemplateReplyGenerator::new()),
        )
    }

    pub fn catalog(&self) -> &Arc<AssistantCatalog> {
        &self.catalog
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// Open a chat with an assistant: reuse its most recently updated
    /// session or start a new one. Records the assistant in recents.
    pub async fn select_assistant(&self, assistant_id: &str) -> Result<Selection, ChatError> {
        let selection = {
            let mut store = self.store.write().await;
            let model = self.preferences.read().await.preferred_model();
            store.select_assistant(assistant_id, model)?
        };

        let recents = {
            let mut affinity = self.affinity.write().await;
            affinity.record_selection(assistant_id);
            affinity.recents()
        };

        if selection.created {
            self.events.publish(ChatEvent::SessionCreated {
                session_id: selection.session_id,
                assistant_id: assistant_id.to_string(),
            });
        }
        self.events.publish(ChatEvent::ActiveChanged {
            session_id: Some(selection.session_id),
        });
        self.events.publish(ChatEvent::RecentsChanged { recents });
        Ok(selection)
    }

    /// Start a new chat with an assistant ("new chat"). Uses the preferred
    /// model unless one is given.
    pub async fn create_session(
        &self,
        assistant_id: &str,
        model_type: Option<ModelType>,
    ) -> Result<Uuid, ChatError> {
        let session_id = {
            let mut store = self.store.write().await;
            let model = self.preferences.read().await.resolve(model_type);
            store.create_session(assistant_id, model)?
        };

        self.events.publish(ChatEvent::SessionCreated {
            session_id,
            assistant_id: assistant_id.to_string(),
        });
        self.events.publish(ChatEvent::ActiveChanged {
            session_id: Some(session_id),
        });
        Ok(session_id)
    }

    /// Make an existing session active.
    pub async fn select_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.store.write().await.select_session(session_id)?;
        self.events.publish(ChatEvent::ActiveChanged {
            session_id: Some(session_id),
        });
        Ok(())
    }

    /// Delete a session, cancelling any reply in flight for it. Returns the
    /// active session afterwards.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<Option<Uuid>, ChatError> {
        let deletion = self.store.write().await.delete_session(session_id)?;
        self.orchestrator.forget_session(session_id).await;

        self.events.publish(ChatEvent::SessionDeleted { session_id });
        if deletion.was_active {
            self.events.publish(ChatEvent::ActiveChanged {
                session_id: deletion.active,
            });
        }
        Ok(deletion.active)
    }

    /// Reset a session to its greeting.
    pub async fn clear_messages(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.store.write().await.clear_messages(session_id)?;
        info!(session_id = %session_id, "Session cleared");
        Ok(())
    }

    // ── Replies ─────────────────────────────────────────────────────

    /// Send a message in the active session. The reply arrives in the
    /// background; watch events or poll the session.
    pub async fn send_message(&self, content: &str) -> Result<SendReceipt, ChatError> {
        self.orchestrator.send_message(content).await
    }

    /// Cancel the reply in flight for a session.
    pub async fn cancel_reply(&self, session_id: Uuid) -> Result<bool, ChatError> {
        self.orchestrator.cancel_reply(session_id).await
    }

    pub async fn is_pending(&self, session_id: Uuid) -> bool {
        self.orchestrator.is_pending(session_id).await
    }

    /// Sends currently in flight.
    pub async fn in_flight(&self) -> Vec<ReplyTicket> {
        self.orchestrator.in_flight().await
    }

    /// Wait for every in-flight reply to finish.
    pub async fn wait_idle(&self) {
        self.orchestrator.wait_idle().await
    }

    /// Cancel every in-flight reply.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await
    }

    // ── Preferences ─────────────────────────────────────────────────

    /// Default model for future sessions.
    pub async fn set_preferred_model(&self, model_type: ModelType) {
        self.preferences.write().await.set_preferred_model(model_type);
    }

    pub async fn preferred_model(&self) -> ModelType {
        self.preferences.read().await.preferred_model()
    }

    /// Switch the active session's model.
    pub async fn change_model(&self, model_type: ModelType) -> Result<Uuid, ChatError> {
        let session_id = {
            let mut store = self.store.write().await;
            let preferences = self.preferences.read().await;
            preferences.change_model(&mut store, model_type)?
        };
        self.events.publish(ChatEvent::ModelChanged {
            session_id,
            model_type,
        });
        Ok(session_id)
    }

    // ── Favorites & recents ─────────────────────────────────────────

    /// Flip an assistant's favorite status. Returns whether it is now a favorite.
    pub async fn toggle_favorite(&self, assistant_id: &str) -> Result<bool, ChatError> {
        let (now_favorite, favorites) = {
            let mut affinity = self.affinity.write().await;
            let now_favorite = affinity.toggle_favorite(&self.catalog, assistant_id)?;
            (now_favorite, affinity.favorites())
        };
        self.events.publish(ChatEvent::FavoritesChanged { favorites });
        Ok(now_favorite)
    }

    pub async fn is_favorite(&self, assistant_id: &str) -> bool {
        self.affinity.read().await.is_favorite(assistant_id)
    }

    pub async fn favorites(&self) -> Vec<String> {
        self.affinity.read().await.favorites()
    }

    pub async fn recents(&self) -> Vec<String> {
        self.affinity.read().await.recents()
    }

    /// Favorite assistants in catalog order.
    pub async fn favorite_assistants(&self) -> Vec<Assistant> {
        let affinity = self.affinity.read().await;
        affinity
            .favorite_assistants(&self.catalog)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Recently selected assistants, most recent first.
    pub async fn recent_assistants(&self) -> Vec<Assistant> {
        let affinity = self.affinity.read().await;
        affinity
            .recent_assistants(&self.catalog)
            .into_iter()
            .cloned()
            .collect()
    }

    // ── Reads ───────────────────────────────────────────────────────

    pub async fn active_session(&self) -> Option<ChatSession> {
        self.store.read().await.active().cloned()
    }

    pub async fn active_session_id(&self) -> Option<Uuid> {
        self.store.read().await.active_id()
    }

    /// The active session as displayed, placeholder included.
    pub async fn active_view(&self) -> Option<SessionView> {
        self.store.read().await.active().map(SessionView::from)
    }

    pub async fn session(&self, session_id: Uuid) -> Option<ChatSession> {
        self.store.read().await.get(session_id).cloned()
    }

    /// All sessions, head first.
    pub async fn sessions(&self) -> Vec<ChatSession> {
        self.store
            .read()
            .await
            .list()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Everything a UI host needs to render.
    pub async fn snapshot(&self) -> EngineSnapshot {
        let store = self.store.read().await;
        let preferences = self.preferences.read().await;
        let affinity = self.affinity.read().await;
        EngineSnapshot {
            sessions: store.list().into_iter().map(SessionView::from).collect(),
            active_session_id: store.active_id(),
            favorites: affinity.favorites(),
            recents: affinity.recents(),
            preferred_model: preferences.preferred_model(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::catalog::builtin::{COACH, NUTRITIONIST, SLEEP_SPECIALIST};
    use crate::config::PendingPolicy;
    use crate::error::LlmError;
    use crate::reply::{GENERATION_FAILED_MESSAGE, ReplyRequest};
    use crate::session::{MessageKind, Role};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Echoes the last user message.
    struct EchoGenerator;

    #[async_trait]
    impl ReplyGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, request: &ReplyRequest) -> Result<String, LlmError> {
            let last = request.last_user_message().map(|m| m.content.clone());
            Ok(format!("echo: {}", last.unwrap_or_default()))
        }
    }

    struct PanickingGenerator;

    #[async_trait]
    impl ReplyGenerator for PanickingGenerator {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn generate(&self, _request: &ReplyRequest) -> Result<String, LlmError> {
            panic!("generator exploded");
        }
    }

    /// Blocks until a permit is released, then echoes.
    struct GatedGenerator {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ReplyGenerator for GatedGenerator {
        fn name(&self) -> &str {
            "gated"
        }
        async fn generate(&self, request: &ReplyRequest) -> Result<String, LlmError> {
            let _permit = self.gate.acquire().await.map_err(|e| LlmError::RequestFailed {
                provider: "gated".into(),
                reason: e.to_string(),
            })?;
            Ok(format!("reply to {}", request.assistant.id))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ReplyGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }
        async fn generate(&self, _request: &ReplyRequest) -> Result<String, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    fn engine_with(generator: Arc<dyn ReplyGenerator>, config: ChatConfig) -> ChatEngine {
        ChatEngine::new(config, Arc::new(AssistantCatalog::builtin()), generator)
    }

    fn echo_engine() -> ChatEngine {
        engine_with(Arc::new(EchoGenerator), ChatConfig::immediate())
    }

    fn gated_engine(config: ChatConfig) -> (ChatEngine, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let engine = engine_with(
            Arc::new(GatedGenerator {
                gate: Arc::clone(&gate),
            }),
            config,
        );
        (engine, gate)
    }

    async fn wait_for_thinking(rx: &mut broadcast::Receiver<ChatEvent>, session_id: Uuid) {
        tokio::time::timeout(TEST_TIMEOUT, async {
            loop {
                if let Ok(ChatEvent::ThinkingStarted { session_id: id, .. }) = rx.recv().await {
                    if id == session_id {
                        return;
                    }
                }
            }
        })
        .await
        .expect("thinking placeholder never shown");
    }

    async fn wait_idle(engine: &ChatEngine) {
        tokio::time::timeout(TEST_TIMEOUT, engine.wait_idle())
            .await
            .expect("pipeline did not settle");
    }

    async fn assert_active_consistent(engine: &ChatEngine) {
        match engine.active_session_id().await {
            Some(id) => assert_eq!(engine.active_session().await, engine.session(id).await),
            None => assert!(engine.active_session().await.is_none()),
        }
    }

    #[tokio::test]
    async fn selecting_coach_creates_greeted_session() {
        let engine = echo_engine();
        let sel = engine.select_assistant(COACH).await.unwrap();
        assert!(sel.created);

        let session = engine.active_session().await.unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::Assistant);
        assert_eq!(
            session.messages[0].content,
            engine.catalog().get(COACH).unwrap().greeting
        );
        assert_eq!(engine.recents().await, vec![COACH]);
        assert_active_consistent(&engine).await;
    }

    #[tokio::test]
    async fn send_grows_by_two_after_resolution() {
        let engine = echo_engine();
        engine.select_assistant(COACH).await.unwrap();
        let before = engine.active_session().await.unwrap().messages.len();

        let receipt = engine.send_message("hello").await.unwrap();
        let after_send = engine.session(receipt.session_id).await.unwrap();
        assert_eq!(after_send.messages.len(), before + 1);
        assert_eq!(after_send.messages.last().unwrap().content, "hello");
        assert!(after_send.is_pending());

        wait_idle(&engine).await;
        let resolved = engine.session(receipt.session_id).await.unwrap();
        assert_eq!(resolved.messages.len(), before + 2);
        assert_eq!(resolved.messages.last().unwrap().content, "echo: hello");
        assert!(!resolved.is_pending());
        assert!(resolved.display_messages().iter().all(|m| !m.is_thinking));
        assert_eq!(resolved.updated_at, resolved.messages.last().unwrap().timestamp);
        assert_active_consistent(&engine).await;
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_change() {
        let engine = echo_engine();
        engine.select_assistant(COACH).await.unwrap();
        let before = engine.active_session().await;

        assert_eq!(engine.send_message("   \n").await.unwrap_err(), ChatError::EmptyMessage);
        assert_eq!(engine.active_session().await, before);
    }

    #[tokio::test]
    async fn send_without_active_session() {
        let engine = echo_engine();
        assert_eq!(engine.send_message("hi").await.unwrap_err(), ChatError::NoActiveSession);
    }

    #[tokio::test]
    async fn placeholder_is_single_and_last_while_thinking() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let mut rx = engine.subscribe();
        let sel = engine.select_assistant(COACH).await.unwrap();
        engine.send_message("hello").await.unwrap();
        wait_for_thinking(&mut rx, sel.session_id).await;

        let view = engine.active_view().await.unwrap();
        assert!(view.pending);
        assert_eq!(view.messages.iter().filter(|m| m.is_thinking).count(), 1);
        assert!(view.messages.last().unwrap().is_thinking);
        let stored = engine.session(sel.session_id).await.unwrap();
        assert!(stored.messages.iter().all(|m| !m.is_thinking));

        gate.add_permits(1);
        wait_idle(&engine).await;
        let view = engine.active_view().await.unwrap();
        assert!(!view.pending);
        assert!(view.messages.iter().all(|m| !m.is_thinking));
    }

    #[tokio::test]
    async fn reply_lands_in_originating_session_after_switch() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let origin = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();

        let other = engine.select_assistant(NUTRITIONIST).await.unwrap().session_id;
        assert_eq!(engine.active_session_id().await, Some(other));

        gate.add_permits(1);
        wait_idle(&engine).await;

        let origin_session = engine.session(origin).await.unwrap();
        assert_eq!(origin_session.messages.len(), 3);
        assert_eq!(
            origin_session.messages.last().unwrap().content,
            format!("reply to {COACH}")
        );
        let other_session = engine.session(other).await.unwrap();
        assert_eq!(other_session.messages.len(), 1);
        assert_active_consistent(&engine).await;
    }

    #[tokio::test]
    async fn deleting_session_mid_reply_suppresses_it() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let mut rx = engine.subscribe();
        let keep = engine.select_assistant(NUTRITIONIST).await.unwrap().session_id;
        let doomed = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        wait_for_thinking(&mut rx, doomed).await;

        assert_eq!(engine.delete_session(doomed).await.unwrap(), Some(keep));
        gate.add_permits(1);
        wait_idle(&engine).await;

        assert!(engine.session(doomed).await.is_none());
        assert!(engine.in_flight().await.is_empty());
        assert_eq!(engine.session(keep).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn per_session_policy_allows_parallel_sessions() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let a = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("one").await.unwrap();
        assert_eq!(
            engine.send_message("two").await.unwrap_err(),
            ChatError::ReplyPending { session_id: a }
        );

        let b = engine.select_assistant(NUTRITIONIST).await.unwrap().session_id;
        engine.send_message("three").await.unwrap();
        assert!(engine.is_pending(a).await);
        assert!(engine.is_pending(b).await);
        assert_eq!(engine.in_flight().await.len(), 2);

        gate.add_permits(2);
        wait_idle(&engine).await;
        assert_eq!(engine.session(a).await.unwrap().messages.len(), 3);
        assert_eq!(engine.session(b).await.unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn global_policy_serializes_all_replies() {
        let config = ChatConfig {
            pending_policy: PendingPolicy::Global,
            ..ChatConfig::immediate()
        };
        let (engine, gate) = gated_engine(config);
        let a = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("one").await.unwrap();

        let b = engine.select_assistant(NUTRITIONIST).await.unwrap().session_id;
        let before = engine.session(b).await.unwrap();
        assert_eq!(
            engine.send_message("two").await.unwrap_err(),
            ChatError::ReplyPending { session_id: a }
        );
        assert_eq!(engine.session(b).await.unwrap(), before);

        gate.add_permits(1);
        wait_idle(&engine).await;
        engine.send_message("two").await.unwrap();
        gate.add_permits(1);
        wait_idle(&engine).await;
        assert_eq!(engine.session(b).await.unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn generation_failure_becomes_visible_error() {
        let engine = engine_with(Arc::new(FailingGenerator), ChatConfig::immediate());
        let mut rx = engine.subscribe();
        let id = engine.select_assistant(SLEEP_SPECIALIST).await.unwrap().session_id;
        engine.send_message("why can't I sleep").await.unwrap();
        wait_idle(&engine).await;

        let session = engine.session(id).await.unwrap();
        assert_eq!(session.messages.len(), 3);
        let last = session.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, GENERATION_FAILED_MESSAGE);
        assert!(!session.is_pending());

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::ReplyFailed { error, .. } = event {
                assert!(error.contains("boom"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);

        // Input is usable again.
        engine.send_message("still there?").await.unwrap();
    }

    #[tokio::test]
    async fn generator_panic_is_reported_as_failure() {
        let config = ChatConfig {
            pending_policy: PendingPolicy::Global,
            ..ChatConfig::immediate()
        };
        let engine = engine_with(Arc::new(PanickingGenerator), config);
        let mut rx = engine.subscribe();
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        wait_idle(&engine).await;

        let session = engine.session(id).await.unwrap();
        assert_eq!(session.messages.len(), 3);
        let last = session.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert_eq!(last.content, GENERATION_FAILED_MESSAGE);
        assert!(!session.is_pending());
        assert!(engine.in_flight().await.is_empty());

        let mut failure = None;
        while let Ok(event) = rx.try_recv() {
            if let ChatEvent::ReplyFailed { error, .. } = event {
                failure = Some(error);
            }
        }
        assert!(failure.unwrap().contains("generator exploded"));

        // Global policy is not wedged by the dead reply.
        engine.send_message("again").await.unwrap();
        wait_idle(&engine).await;
        assert!(!engine.is_pending(id).await);
    }

    #[tokio::test]
    async fn engine_from_env_uses_builtin_catalog() {
        let engine = ChatEngine::from_env().unwrap();
        assert!(engine.catalog().contains(COACH));
        assert_eq!(engine.preferred_model().await, engine.config().default_model);
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let config = ChatConfig {
            generation_timeout: Duration::from_millis(20),
            ..ChatConfig::immediate()
        };
        let (engine, _gate) = gated_engine(config);
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        wait_idle(&engine).await;

        let session = engine.session(id).await.unwrap();
        assert_eq!(session.messages.last().unwrap().kind, MessageKind::Error);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn cancel_reply_keeps_user_message_only() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let mut rx = engine.subscribe();
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        wait_for_thinking(&mut rx, id).await;

        assert!(engine.cancel_reply(id).await.unwrap());
        assert!(!engine.is_pending(id).await);
        assert!(!engine.cancel_reply(id).await.unwrap());

        gate.add_permits(1);
        wait_idle(&engine).await;
        let session = engine.session(id).await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages.last().unwrap().role, Role::User);
        assert!(session.display_messages().iter().all(|m| !m.is_thinking));
    }

    #[tokio::test]
    async fn shutdown_cancels_everything() {
        let (engine, _gate) = gated_engine(ChatConfig::immediate());
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        engine.shutdown().await;
        wait_idle(&engine).await;
        assert!(!engine.is_pending(id).await);
        assert!(engine.in_flight().await.is_empty());
        assert_eq!(engine.session(id).await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn deleting_only_session_clears_active() {
        let engine = echo_engine();
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        assert_eq!(engine.delete_session(id).await.unwrap(), None);
        assert!(engine.active_session().await.is_none());
        assert!(engine.sessions().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_active_activates_new_head() {
        let engine = echo_engine();
        let a = engine.create_session(COACH, None).await.unwrap();
        let b = engine.create_session(NUTRITIONIST, None).await.unwrap();
        let c = engine.create_session(SLEEP_SPECIALIST, None).await.unwrap();
        engine.select_session(a).await.unwrap();

        assert_eq!(engine.delete_session(a).await.unwrap(), Some(c));
        let ids: Vec<Uuid> = engine.sessions().await.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![c, b]);
        assert_active_consistent(&engine).await;
    }

    #[tokio::test]
    async fn models_follow_preferences() {
        let engine = echo_engine();
        engine.set_preferred_model(ModelType::Pro).await;
        let pro = engine.create_session(COACH, None).await.unwrap();
        let lite = engine.create_session(COACH, Some(ModelType::Lite)).await.unwrap();
        assert_eq!(engine.session(pro).await.unwrap().model_type, ModelType::Pro);
        assert_eq!(engine.session(lite).await.unwrap().model_type, ModelType::Lite);

        assert_eq!(engine.change_model(ModelType::Standard).await.unwrap(), lite);
        assert_eq!(engine.session(lite).await.unwrap().model_type, ModelType::Standard);
        assert_eq!(engine.session(pro).await.unwrap().model_type, ModelType::Pro);
        assert_eq!(engine.preferred_model().await, ModelType::Pro);
        assert_active_consistent(&engine).await;
    }

    #[tokio::test]
    async fn favorites_and_recents() {
        let engine = echo_engine();
        assert!(engine.toggle_favorite(COACH).await.unwrap());
        assert!(engine.is_favorite(COACH).await);
        assert!(!engine.toggle_favorite(COACH).await.unwrap());
        assert!(engine.favorites().await.is_empty());
        assert!(engine.toggle_favorite("ghost").await.unwrap_err().is_not_found());

        engine.select_assistant(COACH).await.unwrap();
        engine.select_assistant(NUTRITIONIST).await.unwrap();
        engine.select_assistant(COACH).await.unwrap();
        assert_eq!(engine.recents().await, vec![COACH, NUTRITIONIST]);
        let recent: Vec<String> = engine
            .recent_assistants()
            .await
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(recent, vec![COACH, NUTRITIONIST]);
        assert!(engine.select_assistant("ghost").await.is_err());
        assert_eq!(engine.recents().await.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_serializes_views() {
        let (engine, gate) = gated_engine(ChatConfig::immediate());
        let mut rx = engine.subscribe();
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.toggle_favorite(COACH).await.unwrap();
        engine.send_message("hello").await.unwrap();
        wait_for_thinking(&mut rx, id).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.active_session_id, Some(id));
        assert_eq!(snapshot.favorites, vec![COACH]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["sessions"][0]["pending"], true);
        assert_eq!(json["sessions"][0]["messages"][2]["is_thinking"], true);
        assert_eq!(json["preferred_model"], "standard");

        gate.add_permits(1);
        wait_idle(&engine).await;
    }

    #[tokio::test]
    async fn clear_messages_resets_history() {
        let engine = echo_engine();
        let id = engine.select_assistant(COACH).await.unwrap().session_id;
        engine.send_message("hello").await.unwrap();
        wait_idle(&engine).await;
        engine.clear_messages(id).await.unwrap();
        assert_eq!(engine.session(id).await.unwrap().messages.len(), 1);
    }
}
