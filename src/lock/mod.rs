mod acquisition;
mod backoff;
mod config;
mod locker;
mod staleness;

pub use backoff::{BackoffPolicy, Delay, ExponentialBackoff};
pub use config::{LockConfig, DEFAULT_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_STALE_AFTER};
pub use locker::Locker;
pub use staleness::{is_stale, Clock, SystemClock};
