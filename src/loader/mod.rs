//! Session-scoped loaders that fetch remote data and cache it in memory.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod calls;
pub mod resource;

pub use calls::{CallLoader, CallPage, CallPager, CallSnapshot, PageRequest, RetellPager, WebhookPager};
pub use resource::{ResourceLoader, ResourceSnapshot};

/// What a load request ended up doing. Loaders never return `Err`; failures
/// are reported here and kept in the loader state for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fresh data replaced the cache.
    Loaded { count: usize },
    /// The page loop stopped early; the records gathered so far were kept.
    Partial { count: usize, error: String },
    /// Served from cache, nothing was fetched.
    Cached,
    /// Another load of the same resource is in flight.
    AlreadyLoading,
    /// The remote reported an empty set earlier; only a forced refresh retries.
    Unavailable,
    /// Too many consecutive failures; only a forced refresh retries.
    GaveUp,
    /// Incremental paging already reached the last page.
    NoMorePages,
    Failed { error: String },
    MissingCredentials,
}

impl LoadOutcome {
    pub fn fetched(&self) -> bool {
        matches!(
            self,
            LoadOutcome::Loaded { .. } | LoadOutcome::Partial { .. } | LoadOutcome::Failed { .. }
        )
    }
}

/// Holds the in-flight flag for the lifetime of one load.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
