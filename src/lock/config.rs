use super::backoff::{BackoffPolicy, Delay, ExponentialBackoff};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(15_000);
pub const DEFAULT_MAX_RETRIES: u32 = 128;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Age past which an existing lock file is ignored.
    pub stale_after: Duration,
    /// Retries allowed against a live lock before giving up.
    pub max_retries: u32,
    /// Ceiling for the default backoff curve.
    pub interval: Duration,
    /// Replaces the default [`ExponentialBackoff`] when set.
    pub backoff: Option<Arc<dyn BackoffPolicy>>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            max_retries: DEFAULT_MAX_RETRIES,
            interval: DEFAULT_INTERVAL,
            backoff: None,
        }
    }
}

impl LockConfig {
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Delay {
        match &self.backoff {
            Some(policy) => policy.delay(attempt),
            None => ExponentialBackoff::new(self.interval).delay(attempt),
        }
    }
}
