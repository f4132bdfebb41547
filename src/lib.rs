//! Advisory cross-process locking through sentinel files
//!
//! A process holds the lock by creating the lock file with an exclusive
//! create, and releases it by deleting the file. Lock files older than the
//! configured threshold are considered abandoned and get replaced.

pub mod error;
pub mod exit;
pub mod fs;
pub mod lock;
pub mod utils;

pub use error::{LockError, Result};
pub use exit::run_exit_hooks;
pub use fs::{Filesystem, OsFilesystem};
pub use lock::{BackoffPolicy, Clock, Delay, ExponentialBackoff, LockConfig, Locker, SystemClock};
