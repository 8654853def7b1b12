use std::time::Duration;
use tokio::time::Instant;

/// When a cached set was last replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStamp {
    updated_at: Option<Instant>,
}

impl CacheStamp {
    pub fn touch(&mut self) {
        self.updated_at = Some(Instant::now());
    }

    pub fn clear(&mut self) {
        self.updated_at = None;
    }

    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|at| at.elapsed())
    }

    /// Never-filled stamps are stale.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age().is_some_and(|age| age < ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl() {
        let ttl = Duration::from_secs(15 * 60);
        let mut stamp = CacheStamp::default();
        assert!(!stamp.is_fresh(ttl));

        stamp.touch();
        assert!(stamp.is_fresh(ttl));

        tokio::time::advance(Duration::from_secs(14 * 60)).await;
        assert!(stamp.is_fresh(ttl));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!stamp.is_fresh(ttl));

        stamp.clear();
        assert!(stamp.updated_at().is_none());
    }
}
