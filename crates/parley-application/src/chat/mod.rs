//! Chat orchestration.
//!
//! - `state`: the conversation state, its published snapshot and the pure
//!   reducer applying stream events to a message
//! - `orchestrator`: the public operations driving an exchange end to end

mod orchestrator;
mod state;

pub use orchestrator::{ChatOrchestrator, OutgoingMessage, SwitchOutcome};
pub use state::{
    ChatSnapshot, ERROR_PREFIX, STOPPED_PLACEHOLDER, Termination, apply_stream_event, finish,
};
