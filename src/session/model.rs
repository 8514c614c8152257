//! Session data model: messages, sessions, model types and reply state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Assistant;

/// Maximum characters kept when a session is retitled from a user message.
const TITLE_MAX_CHARS: usize = 30;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// What a message carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Regular conversational text.
    #[default]
    Text,
    /// A visible error shown in place of a reply that could not be generated.
    Error,
}

/// Reply model a session is bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Lite,
    #[default]
    Standard,
    Pro,
}

impl ModelType {
    pub const ALL: [ModelType; 3] = [Self::Lite, Self::Standard, Self::Pro];
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lite => write!(f, "lite"),
            Self::Standard => write!(f, "standard"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lite" => Ok(Self::Lite),
            "standard" => Ok(Self::Standard),
            "pro" => Ok(Self::Pro),
            _ => Err(format!("Unknown model type: {}", s)),
        }
    }
}

/// A single message in a session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID.
    pub id: Uuid,
    /// Store-wide monotonic sequence number; orders messages independently
    /// of wall-clock ties.
    pub seq: u64,
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
    /// Set only on the ephemeral placeholder produced for display.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_thinking: bool,
    /// Text or visible error.
    #[serde(default)]
    pub kind: MessageKind,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, seq: u64, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_thinking: false,
            kind,
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>, seq: u64) -> Self {
        Self::new(Role::User, content, seq, MessageKind::Text)
    }

    /// An assistant reply.
    pub fn assistant(content: impl Into<String>, seq: u64) -> Self {
        Self::new(Role::Assistant, content, seq, MessageKind::Text)
    }

    /// A visible assistant-side error message.
    pub fn error(content: impl Into<String>, seq: u64) -> Self {
        Self::new(Role::Assistant, content, seq, MessageKind::Error)
    }

    /// The transient "thinking" marker. Never stored in a session log.
    pub fn thinking_placeholder(seq: u64, since: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::nil(),
            seq,
            role: Role::Assistant,
            content: String::new(),
            timestamp: since,
            is_thinking: true,
            kind: MessageKind::Text,
        }
    }
}

/// Per-session reply progress.
///
/// The thinking marker lives here rather than in the message log, so it can
/// never leak into persisted history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplyState {
    #[default]
    Idle,
    /// User message appended; placeholder not shown yet.
    Pending {
        request_id: Uuid,
        since: DateTime<Utc>,
    },
    /// Placeholder is visible.
    Thinking {
        request_id: Uuid,
        since: DateTime<Utc>,
    },
}

impl ReplyState {
    /// The request currently owning this session, if any.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Idle => None,
            Self::Pending { request_id, .. } | Self::Thinking { request_id, .. } => {
                Some(*request_id)
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// One conversation thread bound to exactly one assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Unique session ID.
    pub id: Uuid,
    /// Assistant this session talks to.
    pub assistant_id: String,
    /// Model used for replies in this session.
    pub model_type: ModelType,
    /// Display title.
    pub title: String,
    /// Ordered message log.
    pub messages: Vec<ChatMessage>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent message.
    pub updated_at: DateTime<Utc>,
    /// In-flight reply progress.
    #[serde(default)]
    pub reply_state: ReplyState,
}

impl ChatSession {
    /// Create a session seeded with the assistant's greeting.
    pub fn new(assistant: &Assistant, model_type: ModelType, greeting_seq: u64) -> Self {
        let greeting = ChatMessage::assistant(&assistant.greeting, greeting_seq);
        let now = greeting.timestamp;
        Self {
            id: Uuid::new_v4(),
            assistant_id: assistant.id.clone(),
            model_type,
            title: assistant.name.clone(),
            messages: vec![greeting],
            created_at: now,
            updated_at: now,
            reply_state: ReplyState::Idle,
        }
    }

    /// Append a message, keeping `updated_at` equal to the newest timestamp and
    /// never letting it move backwards.
    pub fn push(&mut self, mut message: ChatMessage) {
        if message.timestamp < self.updated_at {
            message.timestamp = self.updated_at;
        }
        if message.role == Role::User && !self.has_user_messages() {
            self.title = title_from(&message.content);
        }
        self.updated_at = message.timestamp;
        self.messages.push(message);
    }

    /// Whether any user message has been sent.
    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    /// Whether a reply is in flight.
    pub fn is_pending(&self) -> bool {
        !self.reply_state.is_idle()
    }

    /// The most recent message in the log.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Message log as shown to the user: the stored log plus the thinking
    /// placeholder at the end while one is visible.
    pub fn display_messages(&self) -> Vec<ChatMessage> {
        let mut out = self.messages.clone();
        if let ReplyState::Thinking { since, .. } = self.reply_state {
            let seq = self.messages.last().map(|m| m.seq + 1).unwrap_or(0);
            out.push(ChatMessage::thinking_placeholder(seq, since));
        }
        out
    }
}

fn title_from(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant() -> Assistant {
        Assistant::new("coach-001", "Coach", "Coach Max", "Hello!")
    }

    #[test]
    fn new_session_seeds_greeting() {
        let session = ChatSession::new(&assistant(), ModelType::Pro, 7);
        assert_eq!(session.messages.len(), 1);
        let greeting = &session.messages[0];
        assert_eq!(greeting.role, Role::Assistant);
        assert_eq!(greeting.content, "Hello!");
        assert_eq!(greeting.seq, 7);
        assert_eq!(session.updated_at, greeting.timestamp);
        assert_eq!(session.title, "Coach Max");
        assert!(session.reply_state.is_idle());
    }

    #[test]
    fn push_clamps_timestamps() {
        let mut session = ChatSession::new(&assistant(), ModelType::Standard, 0);
        let mut stale = ChatMessage::user("hi", 1);
        stale.timestamp = session.updated_at - chrono::Duration::seconds(10);
        session.push(stale);
        assert_eq!(session.messages[1].timestamp, session.updated_at);
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn first_user_message_retitles() {
        let mut session = ChatSession::new(&assistant(), ModelType::Standard, 0);
        session.push(ChatMessage::user("  How should I warm up before squats today?  ", 1));
        assert_eq!(session.title, "How should I warm up before sq…");
        session.push(ChatMessage::user("second", 2));
        assert_eq!(session.title, "How should I warm up before sq…");
    }

    #[test]
    fn short_title_kept_verbatim() {
        let mut session = ChatSession::new(&assistant(), ModelType::Standard, 0);
        session.push(ChatMessage::user("hello", 1));
        assert_eq!(session.title, "hello");
    }

    #[test]
    fn placeholder_only_in_display_view() {
        let mut session = ChatSession::new(&assistant(), ModelType::Standard, 0);
        session.push(ChatMessage::user("hello", 1));
        session.reply_state = ReplyState::Thinking {
            request_id: Uuid::new_v4(),
            since: Utc::now(),
        };

        let shown = session.display_messages();
        assert_eq!(shown.len(), 3);
        assert!(shown[2].is_thinking);
        assert_eq!(shown.iter().filter(|m| m.is_thinking).count(), 1);
        assert!(session.messages.iter().all(|m| !m.is_thinking));
    }

    #[test]
    fn pending_state_shows_no_placeholder() {
        let mut session = ChatSession::new(&assistant(), ModelType::Standard, 0);
        session.reply_state = ReplyState::Pending {
            request_id: Uuid::new_v4(),
            since: Utc::now(),
        };
        assert!(session.is_pending());
        assert_eq!(session.display_messages().len(), 1);
    }

    #[test]
    fn model_type_display_matches_serde() {
        for model in ModelType::ALL {
            let json = serde_json::to_string(&model).unwrap();
            assert_eq!(format!("\"{model}\""), json);
            assert_eq!(model.to_string().parse::<ModelType>().unwrap(), model);
        }
        assert_eq!("PRO".parse::<ModelType>().unwrap(), ModelType::Pro);
        assert!("ultra".parse::<ModelType>().is_err());
    }

    #[test]
    fn thinking_flag_omitted_from_json_when_false() {
        let msg = ChatMessage::user("hi", 0);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("is_thinking").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["kind"], "text");
    }

    #[test]
    fn reply_state_serde_is_tagged() {
        let id = Uuid::new_v4();
        let state = ReplyState::Thinking { request_id: id, since: Utc::now() };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["state"], "thinking");
        assert_eq!(state.request_id(), Some(id));
        assert_eq!(ReplyState::Idle.request_id(), None);
    }
}
