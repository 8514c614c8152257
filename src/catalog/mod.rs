//! Assistant catalog: static, read-only registry of personas.
//!
//! Loaded once at startup and shared by every other component as a pure
//! lookup table. There are no write operations.

pub mod builtin;
pub mod model;

pub use model::Assistant;

/// Ordered, immutable set of assistant personas.
#[derive(Debug, Clone)]
pub struct AssistantCatalog {
    assistants: Vec<Assistant>,
}

impl AssistantCatalog {
    /// The built-in persona set.
    pub fn builtin() -> Self {
        Self::from_assistants(builtin::assistants())
    }

    /// Build a catalog from an explicit list. Later duplicates of an id are dropped.
    pub fn from_assistants(assistants: Vec<Assistant>) -> Self {
        let mut unique: Vec<Assistant> = Vec::with_capacity(assistants.len());
        for assistant in assistants {
            if unique.iter().any(|a| a.id == assistant.id) {
                tracing::warn!(
                    assistant_id = %assistant.id,
                    "Duplicate assistant id in catalog, skipping"
                );
                continue;
            }
            unique.push(assistant);
        }
        Self { assistants: unique }
    }

    /// All assistants in catalog order.
    pub fn list(&self) -> &[Assistant] {
        &self.assistants
    }

    /// Look up an assistant by id.
    pub fn get(&self, id: &str) -> Option<&Assistant> {
        self.assistants.iter().find(|a| a.id == id)
    }

    /// Whether `id` resolves to an assistant.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Assistants whose name, role or specialties match `query`.
    pub fn search(&self, query: &str) -> Vec<&Assistant> {
        self.assistants.iter().filter(|a| a.matches(query)).collect()
    }

    pub fn len(&self) -> usize {
        self.assistants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assistants.is_empty()
    }
}

impl Default for AssistantCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
