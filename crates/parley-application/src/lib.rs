//! Application layer of the Parley streaming session engine.
//!
//! Wires the domain types of `parley-core` into the services a chat window
//! talks to: stream subscriptions, session identity persistence, stale-session
//! recovery and the chat orchestrator.

pub mod chat;
pub mod recovery;
pub mod session;
pub mod stream;

pub use chat::{ChatOrchestrator, ChatSnapshot, OutgoingMessage, SwitchOutcome};
pub use recovery::{RecoveryCoordinator, SendOutcome};
pub use session::SessionIdentityStore;
pub use stream::StreamSubscriber;
