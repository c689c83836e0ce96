//! Key-value persistence interface.
//!
//! Session identity is stored in two tiers: a transient tier that lives as
//! long as the process, and a persisted tier that survives restarts. Keys are
//! built from [`StorageKey`] so that the scoping convention lives in one place.

use async_trait::async_trait;
use strum::Display;

use crate::error::Result;

/// Base name of the active-session key.
const ACTIVE_SESSION_KEY: &str = "parley_session_id";
/// Base name of the session-to-workspace binding key.
const SESSION_WORKSPACE_KEY: &str = "parley_session_workspace";

/// Lifetime of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StorageTier {
    /// Cleared when the process exits.
    Transient,
    /// Survives restarts.
    Persisted,
}

/// Typed storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Active session of one workspace: `parley_session_id_<workspaceId>`.
    ActiveSession { workspace_id: String },
    /// Unscoped active session written by older releases: `parley_session_id`.
    LegacyActiveSession,
    /// Workspace a session id is bound to: `parley_session_workspace_<sessionId>`.
    SessionWorkspace { session_id: String },
}

impl StorageKey {
    pub fn active_session(workspace_id: impl Into<String>) -> Self {
        Self::ActiveSession {
            workspace_id: workspace_id.into(),
        }
    }

    pub fn session_workspace(session_id: impl Into<String>) -> Self {
        Self::SessionWorkspace {
            session_id: session_id.into(),
        }
    }

    /// The string key handed to the store.
    pub fn render(&self) -> String {
        match self {
            Self::ActiveSession { workspace_id } => {
                format!("{}_{}", ACTIVE_SESSION_KEY, workspace_id)
            }
            Self::LegacyActiveSession => ACTIVE_SESSION_KEY.to_string(),
            Self::SessionWorkspace { session_id } => {
                format!("{}_{}", SESSION_WORKSPACE_KEY, session_id)
            }
        }
    }

    /// Legacy keys are only ever read.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::LegacyActiveSession)
    }
}

/// An abstract string key-value store.
///
/// Implementations decide durability; callers pick the tier by picking the
/// store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    ///
    /// - `Ok(Some(value))`: key present
    /// - `Ok(None)`: key absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes a value. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}
