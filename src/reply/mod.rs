//! Reply pipeline: generation port, phase state machine and the orchestrator
//! that runs each send in the background.

pub mod generator;
pub mod orchestrator;
pub mod state;

pub use generator::{ReplyGenerator, ReplyRequest, TemplateReplyGenerator};
pub use orchestrator::{GENERATION_FAILED_MESSAGE, ReplyOrchestrator, SendReceipt};
pub use state::{ReplyPhase, ReplyTicket};
