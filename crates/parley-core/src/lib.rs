//! Domain layer of the Parley streaming session engine.
//!
//! Pure data types and algorithms (content assembly, session identity
//! resolution) plus the traits the engine talks to the outside world
//! through: the backend agent, key-value storage, notifications and audio
//! cues.

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod message;
pub mod notification;
pub mod session;
pub mod sound;
pub mod storage;
pub mod stream;

// Re-export common error type
pub use error::{ParleyError, Result};
