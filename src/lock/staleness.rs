use std::time::{Duration, SystemTime};

/// Source of "now" for lock age calculations.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Whether a lock file last modified at `mtime` no longer confers exclusion.
///
/// The age must strictly exceed `stale_after`. An mtime in the future counts
/// as age zero.
pub fn is_stale(mtime: SystemTime, now: SystemTime, stale_after: Duration) -> bool {
    match now.duration_since(mtime) {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}
