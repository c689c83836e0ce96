//! Session identity persistence.
//!
//! Typed facade over the two storage tiers. It owns the key conventions for
//! the active session of a workspace and for the session-to-workspace
//! bindings that enforce workspace isolation.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::session::{
    INVALID_WORKSPACE_MARKER, SessionCandidates, Topic, resolve_restorable_session_id,
};
use parley_core::storage::{KeyValueStore, StorageKey, StorageTier};
use parley_core::{ParleyError, Result};

#[derive(Clone)]
pub struct SessionIdentityStore {
    transient: Arc<dyn KeyValueStore>,
    persisted: Arc<dyn KeyValueStore>,
}

impl SessionIdentityStore {
    pub fn new(transient: Arc<dyn KeyValueStore>, persisted: Arc<dyn KeyValueStore>) -> Self {
        Self {
            transient,
            persisted,
        }
    }

    fn store(&self, tier: StorageTier) -> &dyn KeyValueStore {
        match tier {
            StorageTier::Transient => self.transient.as_ref(),
            StorageTier::Persisted => self.persisted.as_ref(),
        }
    }

    pub async fn read(&self, tier: StorageTier, key: &StorageKey) -> Result<Option<String>> {
        self.store(tier).get(&key.render()).await
    }

    pub async fn write(&self, tier: StorageTier, key: &StorageKey, value: &str) -> Result<()> {
        if key.is_read_only() {
            return Err(ParleyError::internal(format!(
                "Refusing to write read-only key {}",
                key.render()
            )));
        }
        self.store(tier).set(&key.render(), value).await
    }

    pub async fn delete(&self, tier: StorageTier, key: &StorageKey) -> Result<()> {
        self.store(tier).remove(&key.render()).await
    }

    /// Stored session ids for `workspace_id`, highest priority first.
    pub async fn candidates(&self, workspace_id: &str) -> Result<SessionCandidates> {
        let scoped = StorageKey::active_session(workspace_id);
        Ok(SessionCandidates {
            scoped_transient: self.read(StorageTier::Transient, &scoped).await?,
            scoped_persisted: self.read(StorageTier::Persisted, &scoped).await?,
            legacy: self
                .read(StorageTier::Persisted, &StorageKey::LegacyActiveSession)
                .await?,
        })
    }

    /// The workspace `session_id` is bound to, or `None` if unknown.
    ///
    /// An invalidated session reports [`INVALID_WORKSPACE_MARKER`].
    pub async fn workspace_of(&self, session_id: &str) -> Result<Option<String>> {
        self.read(
            StorageTier::Persisted,
            &StorageKey::session_workspace(session_id),
        )
        .await
    }

    /// Known bindings for a batch of session ids.
    pub async fn workspace_bindings<'a, I>(&self, session_ids: I) -> Result<HashMap<String, String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut bindings = HashMap::new();
        for session_id in session_ids {
            if let Some(owner) = self.workspace_of(session_id).await? {
                bindings.insert(session_id.to_string(), owner);
            }
        }
        Ok(bindings)
    }

    /// Binds `session_id` to `workspace_id` unless it was invalidated.
    ///
    /// Returns false if the session is invalidated.
    pub async fn bind(&self, session_id: &str, workspace_id: &str) -> Result<bool> {
        if self.is_invalidated(session_id).await? {
            return Ok(false);
        }
        self.write(
            StorageTier::Persisted,
            &StorageKey::session_workspace(session_id),
            workspace_id,
        )
        .await?;
        Ok(true)
    }

    /// Binds `session_id` to `workspace_id` only if it has no binding yet.
    pub async fn bind_if_unbound(&self, session_id: &str, workspace_id: &str) -> Result<()> {
        if self.workspace_of(session_id).await?.is_none() {
            self.bind(session_id, workspace_id).await?;
        }
        Ok(())
    }

    /// Records `session_id` as the active session of `workspace_id` in both
    /// tiers and binds it to the workspace.
    pub async fn remember(&self, workspace_id: &str, session_id: &str) -> Result<()> {
        if !self.bind(session_id, workspace_id).await? {
            tracing::warn!(
                "[SessionIdentityStore] Not remembering invalidated session {}",
                session_id
            );
            return Ok(());
        }
        let scoped = StorageKey::active_session(workspace_id);
        self.write(StorageTier::Transient, &scoped, session_id)
            .await?;
        self.write(StorageTier::Persisted, &scoped, session_id)
            .await?;
        Ok(())
    }

    /// Forgets the active session of `workspace_id` in both tiers.
    pub async fn clear_scoped(&self, workspace_id: &str) -> Result<()> {
        let scoped = StorageKey::active_session(workspace_id);
        self.delete(StorageTier::Transient, &scoped).await?;
        self.delete(StorageTier::Persisted, &scoped).await?;
        Ok(())
    }

    /// Marks `session_id` so that it is never restored under any workspace.
    pub async fn invalidate(&self, session_id: &str) -> Result<()> {
        self.write(
            StorageTier::Persisted,
            &StorageKey::session_workspace(session_id),
            INVALID_WORKSPACE_MARKER,
        )
        .await
    }

    pub async fn is_invalidated(&self, session_id: &str) -> Result<bool> {
        Ok(self.workspace_of(session_id).await?.as_deref() == Some(INVALID_WORKSPACE_MARKER))
    }

    /// Drops the binding of a deleted session.
    pub async fn forget(&self, session_id: &str) -> Result<()> {
        self.delete(
            StorageTier::Persisted,
            &StorageKey::session_workspace(session_id),
        )
        .await
    }

    /// Resolves the session to restore for `workspace_id` from `topics`.
    pub async fn resolve(&self, workspace_id: &str, topics: &[Topic]) -> Result<Option<String>> {
        let candidates = self.candidates(workspace_id).await?;
        let bindings = self
            .workspace_bindings(topics.iter().map(|t| t.id.as_str()))
            .await?;
        Ok(resolve_restorable_session_id(
            workspace_id,
            topics,
            &candidates,
            |id| bindings.get(id).cloned(),
        ))
    }
}
