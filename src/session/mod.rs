//! Chat sessions: data model and the store that owns them.

pub mod model;
pub mod store;

pub use model::{ChatMessage, ChatSession, MessageKind, ModelType, ReplyState, Role};
pub use store::{Deletion, Selection, SessionStore};
