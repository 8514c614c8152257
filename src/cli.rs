//! CLI front end: command parsing and event rendering for the stdin REPL.

use crate::events::ChatEvent;
use crate::session::{MessageKind, ModelType};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List assistants, optionally filtered.
    Assistants(Option<String>),
    /// Open a chat with an assistant.
    Select(String),
    /// Start a new chat with the active session's assistant.
    New,
    /// List sessions, head first.
    Sessions,
    /// Activate the n-th listed session (1-based).
    Switch(usize),
    /// Delete the active session.
    Delete,
    /// Toggle an assistant's favorite status.
    Favorite(String),
    /// Show favorites and recents.
    Favorites,
    /// Switch the active session's model.
    Model(ModelType),
    /// Cancel the active session's pending reply.
    Cancel,
    /// Reset the active session to its greeting.
    Clear,
    Help,
    Quit,
    /// Anything that is not a command is sent as a message.
    Send(String),
}

impl Command {
    /// Parse a trimmed, non-empty input line.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_string()));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };

        match (name, arg) {
            ("assistants" | "a", query) => Ok(Self::Assistants(query.map(str::to_string))),
            ("select" | "s", Some(id)) => Ok(Self::Select(id.to_string())),
            ("new", None) => Ok(Self::New),
            ("sessions" | "ls", None) => Ok(Self::Sessions),
            ("switch", Some(n)) => match n.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Self::Switch(n)),
                _ => Err(format!("Not a session number: {n}")),
            },
            ("delete" | "rm", None) => Ok(Self::Delete),
            ("fav", Some(id)) => Ok(Self::Favorite(id.to_string())),
            ("fav" | "favs", None) => Ok(Self::Favorites),
            ("model", Some(m)) => m.parse().map(Self::Model),
            ("cancel", None) => Ok(Self::Cancel),
            ("clear", None) => Ok(Self::Clear),
            ("help" | "h", None) => Ok(Self::Help),
            ("quit" | "q" | "exit", None) => Ok(Self::Quit),
            (name, _) => Err(format!("Unknown command: /{name} (try /help)")),
        }
    }
}

pub const HELP: &str = "\
/assistants [query]  list assistants
/select <id>         chat with an assistant
/new                 new chat with the current assistant
/sessions            list chats
/switch <n>          open chat n
/delete              delete the current chat
/fav <id>            toggle a favorite (/fav alone lists favorites and recents)
/model <name>        lite, standard or pro
/cancel              cancel the pending reply
/clear               reset the current chat
/quit                exit";

/// Text to print for an engine event, if it is worth showing.
pub fn render_event(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::ThinkingStarted { .. } => Some("⏳ thinking...".to_string()),
        ChatEvent::ReplyResolved { message, .. } => Some(format!("\n{}\n", message.content)),
        ChatEvent::ReplyFailed { message, .. } => match message.kind {
            MessageKind::Error => Some(format!("\n❌ {}\n", message.content)),
            MessageKind::Text => Some(format!("\n{}\n", message.content)),
        },
        ChatEvent::ReplyCancelled { .. } => Some("ℹ️  reply cancelled".to_string()),
        ChatEvent::ModelChanged { model_type, .. } => Some(format!("ℹ️  model: {model_type}")),
        _ => None,
    }
}
