//! Session identity resolution.
//!
//! Decides which stored session id, if any, may be restored for a workspace.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Topic;

/// Workspace binding written for a session id that must never be restored.
pub const INVALID_WORKSPACE_MARKER: &str = "__invalid__";

/// What a broken JS promise serializes to when it leaks into storage.
const PROMISE_LITERAL: &str = "[object Promise]";

/// Stored session ids for one workspace, highest priority first.
///
/// The fourth tier, the topic list, is passed separately to the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCandidates {
    /// Scoped key in the transient tier (survives workspace switches only).
    pub scoped_transient: Option<String>,
    /// Scoped key in the persisted tier (survives restarts).
    pub scoped_persisted: Option<String>,
    /// Unscoped key left by older releases, read-only.
    pub legacy: Option<String>,
}

impl SessionCandidates {
    /// Candidates in the order they are tried.
    pub fn in_priority_order(&self) -> [Option<&str>; 3] {
        [
            self.scoped_transient.as_deref(),
            self.scoped_persisted.as_deref(),
            self.legacy.as_deref(),
        ]
    }
}

/// Returns true if `candidate` can be used as a session id.
pub fn is_valid_session_id(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    !trimmed.is_empty() && !candidate.contains('/') && candidate != PROMISE_LITERAL
}

/// Picks the session id to restore for `workspace_id`.
///
/// Stored candidates are tried in priority order and must be valid ids,
/// present in `topics`, and bound to `workspace_id` by
/// `resolve_workspace_of`. If none qualifies the first topic is used unless
/// it is known to belong to another workspace. Returns `None` when there are
/// no topics or nothing survives.
pub fn resolve_restorable_session_id<F>(
    workspace_id: &str,
    topics: &[Topic],
    candidates: &SessionCandidates,
    resolve_workspace_of: F,
) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let topic_ids: HashSet<&str> = topics.iter().map(|t| t.id.as_str()).collect();

    for candidate in candidates.in_priority_order().into_iter().flatten() {
        if !is_valid_session_id(candidate) || !topic_ids.contains(candidate) {
            continue;
        }
        if resolve_workspace_of(candidate).as_deref() != Some(workspace_id) {
            tracing::debug!(
                "[SessionResolver] Rejected candidate {} for workspace {}",
                candidate,
                workspace_id
            );
            continue;
        }
        return Some(candidate.to_string());
    }

    let first = topics.first()?;
    if !is_valid_session_id(&first.id) {
        return None;
    }
    match resolve_workspace_of(&first.id) {
        Some(owner) if owner != workspace_id => None,
        _ => Some(first.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn topics(ids: &[&str]) -> Vec<Topic> {
        ids.iter().map(|id| Topic::new(*id, "t")).collect()
    }

    fn owners(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(s, w)| (s.to_string(), w.to_string()))
            .collect()
    }

    #[test]
    fn test_is_valid_session_id() {
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("   "));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id("[object Promise]"));
        assert!(is_valid_session_id("session_123"));
    }

    #[test]
    fn test_transient_candidate_wins() {
        let map = owners(&[("s1", "ws"), ("s2", "ws")]);
        let candidates = SessionCandidates {
            scoped_transient: Some("s2".to_string()),
            scoped_persisted: Some("s1".to_string()),
            legacy: None,
        };
        let resolved =
            resolve_restorable_session_id("ws", &topics(&["s1", "s2"]), &candidates, |id| {
                map.get(id).cloned()
            });
        assert_eq!(resolved.as_deref(), Some("s2"));
    }

    #[test]
    fn test_invalid_candidates_fall_through_to_lower_tiers() {
        let map = owners(&[("s3", "ws")]);
        let candidates = SessionCandidates {
            scoped_transient: Some("[object Promise]".to_string()),
            scoped_persisted: Some("not-a-topic".to_string()),
            legacy: Some("s3".to_string()),
        };
        let resolved =
            resolve_restorable_session_id("ws", &topics(&["s1", "s3"]), &candidates, |id| {
                map.get(id).cloned()
            });
        assert_eq!(resolved.as_deref(), Some("s3"));
    }

    #[test]
    fn test_candidate_from_other_workspace_is_rejected() {
        let map = owners(&[("s1", "other"), ("s2", "ws")]);
        let candidates = SessionCandidates {
            scoped_transient: Some("s1".to_string()),
            ..Default::default()
        };
        let resolved =
            resolve_restorable_session_id("ws", &topics(&["s2", "s1"]), &candidates, |id| {
                map.get(id).cloned()
            });
        assert_eq!(resolved.as_deref(), Some("s2"));
    }

    #[test]
    fn test_candidate_with_unknown_owner_is_rejected() {
        let candidates = SessionCandidates {
            scoped_persisted: Some("s2".to_string()),
            ..Default::default()
        };
        let resolved =
            resolve_restorable_session_id("ws", &topics(&["s1", "s2"]), &candidates, |_| None);
        // Falls back to the first topic, whose owner is unknown and so acceptable.
        assert_eq!(resolved.as_deref(), Some("s1"));
    }

    #[test]
    fn test_fallback_rejects_known_mismatch() {
        let map = owners(&[("s1", "other")]);
        let resolved = resolve_restorable_session_id(
            "ws",
            &topics(&["s1"]),
            &SessionCandidates::default(),
            |id| map.get(id).cloned(),
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_invalidated_session_is_never_selected() {
        let map = owners(&[("stale", INVALID_WORKSPACE_MARKER)]);
        let candidates = SessionCandidates {
            scoped_transient: Some("stale".to_string()),
            scoped_persisted: Some("stale".to_string()),
            legacy: Some("stale".to_string()),
        };
        let resolved =
            resolve_restorable_session_id("ws", &topics(&["stale"]), &candidates, |id| {
                map.get(id).cloned()
            });
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_no_topics_yields_none() {
        let candidates = SessionCandidates {
            scoped_transient: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_restorable_session_id("ws", &[], &candidates, |_| Some("ws".to_string())),
            None
        );
    }

    #[test]
    fn test_result_never_belongs_to_another_workspace() {
        let map = owners(&[("a", "w1"), ("b", "w2"), ("c", "w1"), ("d", "w2")]);
        let all_topics = topics(&["a", "b", "c", "d"]);
        let ids = ["a", "b", "c", "d", "", "x/y"];
        for workspace in ["w1", "w2", "w3"] {
            for transient in ids {
                for persisted in ids {
                    let candidates = SessionCandidates {
                        scoped_transient: Some(transient.to_string()),
                        scoped_persisted: Some(persisted.to_string()),
                        legacy: Some("b".to_string()),
                    };
                    let resolved =
                        resolve_restorable_session_id(workspace, &all_topics, &candidates, |id| {
                            map.get(id).cloned()
                        });
                    if let Some(id) = resolved {
                        assert_eq!(map.get(&id).map(String::as_str), Some(workspace));
                    }
                }
            }
        }
    }
}
