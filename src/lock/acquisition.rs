//! The acquisition loop as a step-by-step state machine.
//!
//! The machine never touches the filesystem itself. It asks for an I/O
//! operation through [`Action`], the executor performs it (on the calling
//! thread or on the async runtime) and feeds the result back as an
//! [`Outcome`]. Both executors therefore share the exact same decisions.

use super::backoff::Delay;
use super::config::LockConfig;
use super::staleness::{is_stale, Clock};
use crate::error::{LockError, Result};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::SystemTime;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Runs to completion on the calling thread; live contention is fatal.
    Blocking,
    /// Can suspend, so live contention is retried through the backoff policy.
    Scheduled,
}

#[derive(Debug)]
pub(crate) enum Action {
    Create,
    Stat,
    RemoveStale,
    Wait(Delay),
    Finish(Result<()>),
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Created(io::Result<()>),
    Stat(io::Result<SystemTime>),
    Removed(io::Result<()>),
    Waited,
}

pub(crate) struct Acquisition<'a> {
    path: &'a Path,
    config: &'a LockConfig,
    clock: &'a dyn Clock,
    attempts: &'a AtomicU32,
    mode: Mode,
    conflict: Option<io::Error>,
}

impl<'a> Acquisition<'a> {
    pub(crate) fn new(
        path: &'a Path,
        config: &'a LockConfig,
        clock: &'a dyn Clock,
        attempts: &'a AtomicU32,
        mode: Mode,
    ) -> Self {
        debug!("Acquiring lock: {} (mode: {:?})", path.display(), mode);
        Self {
            path,
            config,
            clock,
            attempts,
            mode,
            conflict: None,
        }
    }

    /// First step of a new call. The budget starts from zero even when an
    /// earlier call on the same locker was dropped mid-retry.
    pub(crate) fn start(&self) -> Action {
        self.reset();
        Action::Create
    }

    pub(crate) fn advance(&mut self, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Created(Ok(())) => {
                self.reset();
                debug!("Lock acquired: {}", self.path.display());
                Action::Finish(Ok(()))
            }
            Outcome::Created(Err(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Lock file exists, checking age: {}", self.path.display());
                self.conflict = Some(e);
                Action::Stat
            }
            Outcome::Created(Err(e)) => self.fail(LockError::Create {
                path: self.path.to_path_buf(),
                source: e,
            }),

            // Released between our create and our stat
            Outcome::Stat(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Lock file vanished, retrying: {}", self.path.display());
                Action::Create
            }
            Outcome::Stat(Err(e)) => self.fail(LockError::Stat {
                path: self.path.to_path_buf(),
                source: e,
            }),
            Outcome::Stat(Ok(mtime)) => {
                if is_stale(mtime, self.clock.now(), self.config.stale_after) {
                    debug!("Removing stale lock file: {}", self.path.display());
                    Action::RemoveStale
                } else {
                    self.contended()
                }
            }

            Outcome::Removed(Ok(())) => Action::Create,
            Outcome::Removed(Err(e)) if e.kind() == io::ErrorKind::NotFound => Action::Create,
            Outcome::Removed(Err(e)) => self.fail(LockError::Remove {
                path: self.path.to_path_buf(),
                source: e,
            }),

            Outcome::Waited => Action::Create,
        }
    }

    fn contended(&mut self) -> Action {
        let source = self.take_conflict();

        if self.mode == Mode::Blocking {
            return Action::Finish(Err(LockError::Conflict {
                path: self.path.to_path_buf(),
                source,
            }));
        }

        let attempt = self.attempts.load(Ordering::SeqCst);
        if attempt < self.config.max_retries {
            self.attempts.store(attempt + 1, Ordering::SeqCst);
            self.conflict = Some(source);
            let delay = self.config.delay(attempt);
            debug!(
                "Lock held, retry {} of {} after {:?}: {}",
                attempt + 1,
                self.config.max_retries,
                delay,
                self.path.display()
            );
            Action::Wait(delay)
        } else {
            self.fail(LockError::Exhausted {
                path: self.path.to_path_buf(),
                retries: attempt,
                source,
            })
        }
    }

    fn take_conflict(&mut self) -> io::Error {
        self.conflict
            .take()
            .unwrap_or_else(|| io::Error::from(io::ErrorKind::AlreadyExists))
    }

    fn fail(&self, err: LockError) -> Action {
        self.reset();
        Action::Finish(Err(err))
    }

    fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct FixedClock(SystemTime);

    impl Clock for FixedClock {
        fn now(&self) -> SystemTime {
            self.0
        }
    }

    fn epoch() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn exists() -> io::Error {
        io::Error::from(io::ErrorKind::AlreadyExists)
    }

    fn not_found() -> io::Error {
        io::Error::from(io::ErrorKind::NotFound)
    }

    fn denied() -> io::Error {
        io::Error::from(io::ErrorKind::PermissionDenied)
    }

    struct Fixture {
        config: LockConfig,
        clock: FixedClock,
        attempts: AtomicU32,
    }

    impl Fixture {
        fn new(config: LockConfig) -> Self {
            Self {
                config,
                clock: FixedClock(epoch()),
                attempts: AtomicU32::new(0),
            }
        }

        fn machine(&self, mode: Mode) -> Acquisition<'_> {
            Acquisition::new(
                Path::new("test.lock"),
                &self.config,
                &self.clock,
                &self.attempts,
                mode,
            )
        }
    }

    #[test]
    fn test_success_resets_attempts() {
        let fx = Fixture::new(LockConfig::default());
        fx.attempts.store(5, Ordering::SeqCst);
        let mut m = fx.machine(Mode::Scheduled);

        assert!(matches!(m.start(), Action::Create));
        assert!(matches!(
            m.advance(Outcome::Created(Ok(()))),
            Action::Finish(Ok(()))
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_discards_leftover_attempts() {
        for mode in [Mode::Scheduled, Mode::Blocking] {
            let fx = Fixture::new(LockConfig::default());
            fx.attempts.store(3, Ordering::SeqCst);

            let m = fx.machine(mode);
            assert!(matches!(m.start(), Action::Create));
            assert_eq!(fx.attempts.load(Ordering::SeqCst), 0, "mode {:?}", mode);
        }
    }

    #[test]
    fn test_blocking_success_resets_attempts() {
        let fx = Fixture::new(LockConfig::default());
        fx.attempts.store(2, Ordering::SeqCst);
        let mut m = fx.machine(Mode::Blocking);

        assert!(matches!(
            m.advance(Outcome::Created(Ok(()))),
            Action::Finish(Ok(()))
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_vanished_file_retries_without_budget() {
        let fx = Fixture::new(LockConfig::default().with_max_retries(0));
        let mut m = fx.machine(Mode::Scheduled);

        assert!(matches!(
            m.advance(Outcome::Created(Err(exists()))),
            Action::Stat
        ));
        assert!(matches!(
            m.advance(Outcome::Stat(Err(not_found()))),
            Action::Create
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_file_is_removed_and_recreated() {
        let fx = Fixture::new(LockConfig::default().with_max_retries(0));
        let mut m = fx.machine(Mode::Blocking);
        let old = epoch() - Duration::from_secs(60);

        m.advance(Outcome::Created(Err(exists())));
        assert!(matches!(
            m.advance(Outcome::Stat(Ok(old))),
            Action::RemoveStale
        ));
        // Someone else cleared it first
        assert!(matches!(
            m.advance(Outcome::Removed(Err(not_found()))),
            Action::Create
        ));
        assert!(matches!(
            m.advance(Outcome::Created(Ok(()))),
            Action::Finish(Ok(()))
        ));
    }

    #[test]
    fn test_live_lock_schedules_backoff() {
        let fx = Fixture::new(LockConfig::default());
        let mut m = fx.machine(Mode::Scheduled);

        m.advance(Outcome::Created(Err(exists())));
        assert!(matches!(
            m.advance(Outcome::Stat(Ok(epoch()))),
            Action::Wait(Delay::NextTick)
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(m.advance(Outcome::Waited), Action::Create));

        m.advance(Outcome::Created(Err(exists())));
        assert!(matches!(
            m.advance(Outcome::Stat(Ok(epoch()))),
            Action::Wait(Delay::NextIoBoundary)
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exhausted_reports_original_conflict() {
        let fx = Fixture::new(LockConfig::default().with_max_retries(1));
        let mut m = fx.machine(Mode::Scheduled);

        m.advance(Outcome::Created(Err(exists())));
        m.advance(Outcome::Stat(Ok(epoch())));
        m.advance(Outcome::Waited);
        m.advance(Outcome::Created(Err(exists())));

        match m.advance(Outcome::Stat(Ok(epoch()))) {
            Action::Finish(Err(LockError::Exhausted {
                retries, source, ..
            })) => {
                assert_eq!(retries, 1);
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_mode_fails_on_first_live_conflict() {
        let fx = Fixture::new(LockConfig::default());
        let mut m = fx.machine(Mode::Blocking);

        m.advance(Outcome::Created(Err(exists())));
        match m.advance(Outcome::Stat(Ok(epoch()))) {
            Action::Finish(Err(LockError::Conflict { source, .. })) => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_io_failures_are_not_retried() {
        let fx = Fixture::new(LockConfig::default());
        fx.attempts.store(3, Ordering::SeqCst);

        let mut m = fx.machine(Mode::Scheduled);
        assert!(matches!(
            m.advance(Outcome::Created(Err(denied()))),
            Action::Finish(Err(LockError::Create { .. }))
        ));
        assert_eq!(fx.attempts.load(Ordering::SeqCst), 0);

        let mut m = fx.machine(Mode::Scheduled);
        m.advance(Outcome::Created(Err(exists())));
        assert!(matches!(
            m.advance(Outcome::Stat(Err(denied()))),
            Action::Finish(Err(LockError::Stat { .. }))
        ));

        let mut m = fx.machine(Mode::Scheduled);
        m.advance(Outcome::Created(Err(exists())));
        m.advance(Outcome::Stat(Ok(epoch() - Duration::from_secs(60))));
        assert!(matches!(
            m.advance(Outcome::Removed(Err(denied()))),
            Action::Finish(Err(LockError::Remove { .. }))
        ));
    }
}
