use anyhow::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{InFlight, LoadOutcome};
use crate::cache::CacheStamp;
use crate::config::LoaderSettings;

#[derive(Debug)]
struct ResourceState<T> {
    items: Arc<Vec<T>>,
    loaded: bool,
    unavailable: bool,
    failed_attempts: u32,
    stamp: CacheStamp,
    last_error: Option<String>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            loaded: false,
            unavailable: false,
            failed_attempts: 0,
            stamp: CacheStamp::default(),
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceSnapshot<T> {
    pub items: Arc<Vec<T>>,
    pub loaded: bool,
    pub loading: bool,
    /// The remote had nothing, or the attempt cap was hit.
    pub unavailable: bool,
    pub failed_attempts: u32,
    pub last_error: Option<String>,
    pub last_updated: Option<Instant>,
}

/// Loader for a small, non-paginated remote collection such as the tenant's
/// phone numbers or batch campaigns.
///
/// An empty answer sets a sticky `unavailable` flag and repeated failures are
/// capped; both are only bypassed by a forced load.
pub struct ResourceLoader<T> {
    name: &'static str,
    settings: LoaderSettings,
    state: RwLock<ResourceState<T>>,
    loading: AtomicBool,
}

impl<T: Clone + Send + Sync> ResourceLoader<T> {
    pub fn new(name: &'static str, settings: LoaderSettings) -> Self {
        Self {
            name,
            settings,
            state: RwLock::new(ResourceState::default()),
            loading: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> ResourceSnapshot<T> {
        let state = self.state.read().await;
        ResourceSnapshot {
            items: Arc::clone(&state.items),
            loaded: state.loaded,
            loading: self.is_loading(),
            unavailable: state.unavailable,
            failed_attempts: state.failed_attempts,
            last_error: state.last_error.clone(),
            last_updated: state.stamp.updated_at(),
        }
    }

    pub async fn items(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.state.read().await.items)
    }

    pub async fn reset(&self) {
        *self.state.write().await = ResourceState::default();
    }

    /// Runs `fetch` unless the cache, the sticky flag, the attempt cap or an
    /// in-flight load makes it unnecessary.
    pub async fn load<F, Fut>(&self, force: bool, fetch: F) -> LoadOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let limit = self.settings.resource_attempt_limit;
        {
            let state = self.state.read().await;
            if !force {
                if state.failed_attempts >= limit {
                    debug!(resource = self.name, attempts = state.failed_attempts, "attempt limit reached");
                    return LoadOutcome::GaveUp;
                }
                if state.unavailable {
                    debug!(resource = self.name, "marked unavailable");
                    return LoadOutcome::Unavailable;
                }
                if state.loaded && state.stamp.is_fresh(self.settings.cache_ttl) {
                    debug!(resource = self.name, "using cached items");
                    return LoadOutcome::Cached;
                }
            }
        }

        let Some(_in_flight) = InFlight::try_acquire(&self.loading) else {
            return LoadOutcome::AlreadyLoading;
        };

        if force {
            let mut state = self.state.write().await;
            state.failed_attempts = 0;
            state.unavailable = false;
        }

        match fetch().await {
            Ok(items) => {
                let count = items.len();
                let mut state = self.state.write().await;
                state.unavailable = items.is_empty();
                state.items = Arc::new(items);
                state.loaded = true;
                state.failed_attempts = 0;
                state.last_error = None;
                state.stamp.touch();
                if count == 0 {
                    info!(resource = self.name, "no items available");
                } else {
                    info!(resource = self.name, count, "loaded");
                }
                LoadOutcome::Loaded { count }
            }
            Err(err) => {
                let error = format!("failed to load {}: {:#}", self.name, err);
                let mut state = self.state.write().await;
                state.failed_attempts += 1;
                state.last_error = Some(error.clone());
                if state.failed_attempts >= limit {
                    state.unavailable = true;
                    warn!(resource = self.name, attempts = state.failed_attempts, "giving up until a forced refresh");
                } else {
                    warn!(resource = self.name, attempts = state.failed_attempts, error = %error, "load failed");
                }
                LoadOutcome::Failed { error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn loader() -> ResourceLoader<u32> {
        ResourceLoader::new("numbers", LoaderSettings::default())
    }

    #[tokio::test]
    async fn empty_answer_is_sticky_until_forced() {
        let loader = loader();
        assert_eq!(loader.load(false, || async { Ok(vec![]) }).await, LoadOutcome::Loaded { count: 0 });
        assert!(loader.snapshot().await.unavailable);

        let outcome = loader.load(false, || async { Ok(vec![1]) }).await;
        assert_eq!(outcome, LoadOutcome::Unavailable);

        let outcome = loader.load(true, || async { Ok(vec![1, 2]) }).await;
        assert_eq!(outcome, LoadOutcome::Loaded { count: 2 });
        let snap = loader.snapshot().await;
        assert!(!snap.unavailable);
        assert_eq!(*snap.items, vec![1, 2]);
    }

    #[tokio::test]
    async fn failure_keeps_previous_items() {
        let loader = loader();
        loader.load(false, || async { Ok(vec![7]) }).await;
        let outcome = loader.load(true, || async { Err(anyhow!("boom")) }).await;
        assert!(matches!(outcome, LoadOutcome::Failed { ref error } if error.contains("boom")));
        let snap = loader.snapshot().await;
        assert_eq!(*snap.items, vec![7]);
        assert_eq!(snap.failed_attempts, 1);
        assert!(snap.last_error.is_some());
    }

    #[tokio::test]
    async fn cached_within_ttl() {
        let loader = loader();
        loader.load(false, || async { Ok(vec![1]) }).await;
        assert_eq!(loader.load(false, || async { Ok(vec![9]) }).await, LoadOutcome::Cached);
    }
}
