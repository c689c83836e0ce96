use serde::{Deserialize, Serialize};

use crate::message::now_millis;

/// A persisted conversation thread, bound to one workspace for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub title: String,
    /// Unix milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub messages_count: usize,
}

impl Topic {
    /// Creates an empty topic stamped with the current time.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now_millis(),
            messages_count: 0,
        }
    }
}
