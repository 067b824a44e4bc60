use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of records handed to a forwarder, filtered or not.
///
/// Clones share the same count, so a test can keep a handle while the
/// forwarder owns another.
#[derive(Debug, Clone, Default)]
pub struct ForwardCounter(Arc<AtomicU64>);

impl ForwardCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
