use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation counter shared by everything that resets session state.
///
/// An asynchronous continuation captures [`ResetVersion::current`] before it
/// suspends and checks [`ResetVersion::is_current`] before applying its
/// result. A bump in between means the result is stale and must be dropped.
#[derive(Debug, Clone, Default)]
pub struct ResetVersion {
    counter: Arc<AtomicU64>,
}

impl ResetVersion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Invalidates every previously observed version and returns the new one.
    pub fn bump(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, observed: u64) -> bool {
        self.current() == observed
    }
}
