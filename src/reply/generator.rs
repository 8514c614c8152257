//! Reply-generation port and the built-in template generator.
//!
//! The orchestrator only sees [`ReplyGenerator`]; a model-provider client can
//! be swapped in behind it without touching the pipeline.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::catalog::Assistant;
use crate::error::LlmError;
use crate::session::{ChatMessage, ModelType, Role};

/// Maximum characters of the user's message quoted back in a template reply.
const EXCERPT_MAX_CHARS: usize = 60;

/// Everything a generator needs to produce one reply.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    /// Session the reply is for.
    pub session_id: Uuid,
    /// Persona answering.
    pub assistant: Assistant,
    /// Model the session is bound to.
    pub model_type: ModelType,
    /// Full message history, oldest first, including the triggering user message.
    pub history: Vec<ChatMessage>,
}

impl ReplyRequest {
    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.history.iter().rev().find(|m| m.role == Role::User)
    }
}

/// Produces assistant reply text. Implementations may be slow or fail; the
/// orchestrator bounds and recovers from both.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generator name for logs.
    fn name(&self) -> &str;

    /// Generate reply content for `request`.
    async fn generate(&self, request: &ReplyRequest) -> Result<String, LlmError>;
}

/// Fixed-template generator standing in for a real model provider.
#[derive(Debug, Clone, Default)]
pub struct TemplateReplyGenerator;

impl TemplateReplyGenerator {
    pub fn new() -> Self {
        Self
    }
}

const OPENERS: &[&str] = &[
    "Great question!",
    "Thanks for sharing that.",
    "Good thinking.",
    "I hear you.",
];

#[async_trait]
impl ReplyGenerator for TemplateReplyGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &ReplyRequest) -> Result<String, LlmError> {
        let question = request
            .last_user_message()
            .map(|m| m.content.as_str())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.name().to_string(),
                reason: "no user message in history".to_string(),
            })?;

        let opener = OPENERS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(OPENERS[0]);

        Ok(render_reply(opener, &request.assistant, request.model_type, question))
    }
}

fn render_reply(opener: &str, assistant: &Assistant, model: ModelType, question: &str) -> String {
    let lower = question.to_lowercase();
    let focus = assistant
        .specialties
        .iter()
        .find(|s| lower.contains(&s.to_lowercase()))
        .or_else(|| assistant.specialties.first())
        .map(String::as_str)
        .unwrap_or("the basics");

    let mut reply = format!(
        "{opener} You asked about \"{excerpt}\". As your {role}, I'd start with {focus}.",
        excerpt = excerpt(question),
        role = assistant.role.to_lowercase(),
    );

    match model {
        ModelType::Lite => {}
        ModelType::Standard => {
            reply.push_str(" Want me to put together a step-by-step plan?");
        }
        ModelType::Pro => {
            reply.push_str(
                " I can also go deeper with a detailed, personalized breakdown based on everything you've told me so far.",
            );
        }
    }
    reply
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > EXCERPT_MAX_CHARS {
        let cut: String = trimmed.chars().take(EXCERPT_MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    } else {
        trimmed.to_string()
    }
}
