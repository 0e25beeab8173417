//! Process-wide state version
//!
//! The single inline-cache invalidation signal. Writers advance it after
//! completing a graph mutation while still holding the graph write lock;
//! readers sample it before looking anything up.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Monotonic counter bumped by every lookup-affecting mutation.
///
/// # Example
///
/// ```
/// use object_model::StateVersion;
///
/// let version = StateVersion::new();
/// let before = version.current();
/// let after = version.advance();
/// assert!(after > before);
/// assert_eq!(version.current(), after);
/// ```
#[derive(Debug, Default)]
pub struct StateVersion {
    counter: CachePadded<AtomicU64>,
}

impl StateVersion {
    /// Start at version zero
    pub fn new() -> Self {
        StateVersion {
            counter: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Current version (acquire)
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Advance and return the new version (acquire-release)
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::AcqRel) + 1
    }
}
