//! Assistant persona data model.

use serde::{Deserialize, Serialize};

/// An immutable catalog entry describing one conversational persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assistant {
    /// Stable identifier (e.g. `coach-001`).
    pub id: String,
    /// Short role label shown under the name.
    pub role: String,
    /// Display name.
    pub name: String,
    /// Avatar reference (emoji or asset key).
    pub avatar: String,
    /// One-line description for list views.
    pub description: String,
    /// Areas the persona specializes in.
    #[serde(default)]
    pub specialties: Vec<String>,
    /// Longer introduction for the detail view.
    pub introduction: String,
    /// Things the persona can help with.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// First message of every new session with this persona.
    pub greeting: String,
    /// Suggested conversation starters.
    #[serde(default)]
    pub popular_topics: Vec<String>,
}

impl Assistant {
    /// Create an assistant with the required fields; list fields start empty.
    pub fn new(
        id: impl Into<String>,
        role: impl Into<String>,
        name: impl Into<String>,
        greeting: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            name: name.into(),
            avatar: String::new(),
            description: String::new(),
            specialties: Vec::new(),
            introduction: String::new(),
            capabilities: Vec::new(),
            greeting: greeting.into(),
            popular_topics: Vec::new(),
        }
    }

    /// Builder: set avatar.
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = avatar.into();
        self
    }

    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set introduction.
    pub fn with_introduction(mut self, introduction: impl Into<String>) -> Self {
        self.introduction = introduction.into();
        self
    }

    /// Builder: set specialties.
    pub fn with_specialties<I, S>(mut self, specialties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specialties = specialties.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set capabilities.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set popular topics.
    pub fn with_popular_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.popular_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive match against name, role and specialties.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&needle)
            || self.role.to_lowercase().contains(&needle)
            || self
                .specialties
                .iter()
                .any(|s| s.to_lowercase().contains(&needle))
    }
}
