//! Favorites and recently-used assistants.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, warn};

use crate::catalog::{Assistant, AssistantCatalog};
use crate::error::ChatError;

/// Default length of the recents list.
pub const DEFAULT_RECENTS_CAPACITY: usize = 5;

/// Favorites set plus a bounded most-recent-first list of selected assistants.
#[derive(Debug, Clone)]
pub struct AffinityTracker {
    favorites: BTreeSet<String>,
    recents: VecDeque<String>,
    capacity: usize,
}

impl AffinityTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            favorites: BTreeSet::new(),
            recents: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Flip favorite membership. Returns whether the assistant is now a favorite.
    pub fn toggle_favorite(
        &mut self,
        catalog: &AssistantCatalog,
        assistant_id: &str,
    ) -> Result<bool, ChatError> {
        if !catalog.contains(assistant_id) {
            warn!(assistant_id, "Cannot favorite unknown assistant");
            return Err(ChatError::AssistantNotFound {
                id: assistant_id.to_string(),
            });
        }

        let now_favorite = if self.favorites.remove(assistant_id) {
            false
        } else {
            self.favorites.insert(assistant_id.to_string());
            true
        };
        debug!(assistant_id, favorite = now_favorite, "Favorite toggled");
        Ok(now_favorite)
    }

    /// Move `assistant_id` to the front of recents, dropping any earlier
    /// occurrence and anything past capacity.
    pub fn record_selection(&mut self, assistant_id: &str) {
        self.recents.retain(|id| id != assistant_id);
        self.recents.push_front(assistant_id.to_string());
        self.recents.truncate(self.capacity);
    }

    pub fn is_favorite(&self, assistant_id: &str) -> bool {
        self.favorites.contains(assistant_id)
    }

    /// Favorite ids in sorted order.
    pub fn favorites(&self) -> Vec<String> {
        self.favorites.iter().cloned().collect()
    }

    /// Recent ids, most recent first.
    pub fn recents(&self) -> Vec<String> {
        self.recents.iter().cloned().collect()
    }

    /// Favorites resolved against the catalog, in catalog order.
    pub fn favorite_assistants<'a>(&self, catalog: &'a AssistantCatalog) -> Vec<&'a Assistant> {
        catalog
            .list()
            .iter()
            .filter(|a| self.favorites.contains(&a.id))
            .collect()
    }

    /// Recents resolved against the catalog, most recent first.
    pub fn recent_assistants<'a>(&self, catalog: &'a AssistantCatalog) -> Vec<&'a Assistant> {
        self.recents.iter().filter_map(|id| catalog.get(id)).collect()
    }
}

impl Default for AffinityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RECENTS_CAPACITY)
    }
}
