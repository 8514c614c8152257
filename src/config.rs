//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::ModelType;

/// How many replies may be in flight at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Each session may have one in-flight reply, independent of the others.
    #[default]
    PerSession,
    /// A single in-flight reply across every session.
    Global,
}

impl std::fmt::Display for PendingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerSession => write!(f, "per_session"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for PendingPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_session" => Ok(Self::PerSession),
            "global" => Ok(Self::Global),
            _ => Err(format!("Unknown pending policy: {}", s)),
        }
    }
}

/// Chat engine configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Delay between appending the user message and showing the thinking placeholder.
    pub thinking_delay: Duration,
    /// Delay between showing the placeholder and resolving the reply.
    pub reply_delay: Duration,
    /// Upper bound on a single reply-generation call.
    pub generation_timeout: Duration,
    /// Maximum length of the recents list.
    pub recents_capacity: usize,
    /// Whether pending replies are tracked per session or globally.
    pub pending_policy: PendingPolicy,
    /// Initial preferred model for new sessions.
    pub default_model: ModelType,
    /// Broadcast channel capacity for engine events.
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            thinking_delay: Duration::from_millis(500),
            reply_delay: Duration::from_millis(1500),
            generation_timeout: Duration::from_secs(30),
            recents_capacity: 5,
            pending_policy: PendingPolicy::PerSession,
            default_model: ModelType::default(),
            event_capacity: 256,
        }
    }
}

impl ChatConfig {
    /// Build a config from `PERSONA_CHAT_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let thinking_delay = std::env::var("PERSONA_CHAT_THINKING_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.thinking_delay);

        let reply_delay = std::env::var("PERSONA_CHAT_REPLY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.reply_delay);

        let generation_timeout = std::env::var("PERSONA_CHAT_GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.generation_timeout);

        let pending_policy = std::env::var("PERSONA_CHAT_PENDING_POLICY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pending_policy);

        let default_model = std::env::var("PERSONA_CHAT_MODEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_model);

        Self {
            thinking_delay,
            reply_delay,
            generation_timeout,
            pending_policy,
            default_model,
            ..defaults
        }
    }

    /// Like [`ChatConfig::from_env`], but reports malformed values instead of
    /// silently using the default.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_env();

        if let Some(ms) = parse_var::<u64>("PERSONA_CHAT_THINKING_DELAY_MS")? {
            config.thinking_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("PERSONA_CHAT_REPLY_DELAY_MS")? {
            config.reply_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("PERSONA_CHAT_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = parse_var::<PendingPolicy>("PERSONA_CHAT_PENDING_POLICY")? {
            config.pending_policy = policy;
        }
        if let Some(model) = parse_var::<ModelType>("PERSONA_CHAT_MODEL")? {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Zero-delay config, handy for driving the pipeline in tests.
    pub fn immediate() -> Self {
        Self {
            thinking_delay: Duration::ZERO,
            reply_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
