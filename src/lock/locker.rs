use super::acquisition::{Acquisition, Action, Mode, Outcome};
use super::backoff::Delay;
use super::config::LockConfig;
use super::staleness::{is_stale, Clock, SystemClock};
use crate::error::{LockError, Result};
use crate::exit::Registration;
use crate::fs::{holder_id, Filesystem, OsFilesystem};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Advisory lock backed by a sentinel file.
///
/// Holding the lock means having created the file at [`Locker::path`];
/// releasing it means deleting that file. A file older than
/// [`LockConfig::stale_after`] is treated as abandoned and may be replaced.
///
/// Each operation comes in an async form, which suspends on filesystem calls
/// and backoff delays, and a `_blocking` form that runs on the calling
/// thread. The blocking [`Locker::lock_blocking`] never waits: it only
/// replaces stale files and fails on the first live conflict.
///
/// Lockers never coordinate in-process. Two lockers on the same path race
/// exactly like two processes would.
pub struct Locker {
    path: PathBuf,
    config: LockConfig,
    attempts: AtomicU32,
    filesystem: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    registration: Registration,
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl Locker {
    /// Create a locker for `path`. Does not touch the filesystem.
    pub fn new(path: impl Into<PathBuf>, config: LockConfig) -> Self {
        let path = path.into();
        let filesystem: Arc<dyn Filesystem> = Arc::new(OsFilesystem);
        Self {
            registration: Registration::new(path.clone(), Arc::clone(&filesystem)),
            path,
            config,
            attempts: AtomicU32::new(0),
            filesystem,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
        Self::new(path, LockConfig::default())
    }

    /// Use another filesystem implementation.
    pub fn with_filesystem(mut self, filesystem: impl Filesystem + 'static) -> Self {
        let filesystem: Arc<dyn Filesystem> = Arc::new(filesystem);
        // Replacing the registration drops the old, never-armed one
        self.registration = Registration::new(self.path.clone(), Arc::clone(&filesystem));
        self.filesystem = filesystem;
        self
    }

    /// Use another time source for staleness decisions.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Contention retries consumed by the current [`Locker::lock`] call.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether a live (non-stale) lock file exists.
    pub fn locked_blocking(&self) -> Result<bool> {
        let modified = self.filesystem.modified(&self.path);
        self.classify(modified)
    }

    pub async fn locked(&self) -> Result<bool> {
        let modified = self.offload(|fs, path| fs.modified(path)).await;
        self.classify(modified)
    }

    /// Acquire the lock without waiting.
    ///
    /// Stale lock files are removed and replaced; a live one fails with
    /// [`LockError::Conflict`].
    pub fn lock_blocking(&self) -> Result<()> {
        let holder = holder_id();
        let mut acquisition = self.acquisition(Mode::Blocking);
        let mut action = acquisition.start();

        loop {
            let outcome = match action {
                Action::Create => Outcome::Created(
                    self.filesystem
                        .create_exclusive(&self.path, holder.as_bytes()),
                ),
                Action::Stat => Outcome::Stat(self.filesystem.modified(&self.path)),
                Action::RemoveStale => Outcome::Removed(self.filesystem.remove(&self.path)),
                // Blocking acquisitions never schedule a backoff
                Action::Wait(_) => Outcome::Waited,
                Action::Finish(result) => return self.finish(result),
            };
            action = acquisition.advance(outcome);
        }
    }

    /// Acquire the lock, retrying live contention up to
    /// [`LockConfig::max_retries`] times with backoff.
    ///
    /// Fails with [`LockError::Exhausted`] once the retry budget is spent.
    pub async fn lock(&self) -> Result<()> {
        let holder = Arc::new(holder_id());
        let mut acquisition = self.acquisition(Mode::Scheduled);
        let mut action = acquisition.start();

        loop {
            let outcome = match action {
                Action::Create => {
                    let holder = Arc::clone(&holder);
                    Outcome::Created(
                        self.offload(move |fs, path| fs.create_exclusive(path, holder.as_bytes()))
                            .await,
                    )
                }
                Action::Stat => Outcome::Stat(self.offload(|fs, path| fs.modified(path)).await),
                Action::RemoveStale => {
                    Outcome::Removed(self.offload(|fs, path| fs.remove(path)).await)
                }
                Action::Wait(delay) => {
                    wait(delay).await;
                    Outcome::Waited
                }
                Action::Finish(result) => return self.finish(result),
            };
            action = acquisition.advance(outcome);
        }
    }

    /// Bump the lock file's mtime so a long-running holder does not turn
    /// stale. Never creates the file.
    ///
    /// Fails with [`LockError::Refresh`] if the file is gone, which means
    /// the lock was lost.
    pub fn refresh_blocking(&self) -> Result<()> {
        self.filesystem
            .touch(&self.path)
            .map_err(|e| LockError::Refresh {
                path: self.path.clone(),
                source: e,
            })
    }

    /// Delete the lock file. A missing file is not an error.
    pub fn unlock_blocking(&self) -> Result<()> {
        let removed = self.filesystem.remove(&self.path);
        self.released(removed)
    }

    pub async fn unlock(&self) -> Result<()> {
        let removed = self.offload(|fs, path| fs.remove(path)).await;
        self.released(removed)
    }

    fn acquisition(&self, mode: Mode) -> Acquisition<'_> {
        Acquisition::new(
            &self.path,
            &self.config,
            self.clock.as_ref(),
            &self.attempts,
            mode,
        )
    }

    fn finish(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() {
            self.registration.arm();
        }
        result
    }

    fn classify(&self, modified: io::Result<SystemTime>) -> Result<bool> {
        match modified {
            Ok(mtime) => Ok(!is_stale(mtime, self.clock.now(), self.config.stale_after)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::Stat {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn released(&self, removed: io::Result<()>) -> Result<()> {
        match removed {
            Ok(()) => debug!("Lock released: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Lock already released: {}", self.path.display());
            }
            Err(e) => {
                return Err(LockError::Remove {
                    path: self.path.clone(),
                    source: e,
                })
            }
        }
        self.registration.disarm();
        Ok(())
    }

    /// Run a filesystem call on the blocking pool.
    async fn offload<T, F>(&self, op: F) -> io::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Filesystem, &Path) -> io::Result<T> + Send + 'static,
    {
        let filesystem = Arc::clone(&self.filesystem);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || op(filesystem.as_ref(), &path))
            .await
            .map_err(io::Error::other)?
    }
}

async fn wait(delay: Delay) {
    match delay {
        Delay::NextTick => tokio::task::yield_now().await,
        // Timers fire after the driver has polled for I/O
        Delay::NextIoBoundary => tokio::time::sleep(Duration::ZERO).await,
        Delay::After(duration) => tokio::time::sleep(duration).await,
    }
}
