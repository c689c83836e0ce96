//! Session domain module.
//!
//! # Module Structure
//!
//! - `topic`: the persisted conversation thread (`Topic`)
//! - `identity`: validation and restore resolution of stored session ids
//! - `reset_version`: the generation counter guarding stale async results

mod identity;
mod reset_version;
mod topic;

pub use identity::{
    INVALID_WORKSPACE_MARKER, SessionCandidates, is_valid_session_id,
    resolve_restorable_session_id,
};
pub use reset_version::ResetVersion;
pub use topic::Topic;
