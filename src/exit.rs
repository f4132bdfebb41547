//! Process-wide release of held lock files at exit.
//!
//! Every [`Locker`](crate::Locker) owns a [`Registration`]. The entry is armed
//! while that locker holds its lock file, and at process exit every armed
//! entry is unlinked one after the other. On unix the hook is installed with
//! `atexit(3)` the first time a locker is created; elsewhere, call
//! [`run_exit_hooks`] before the process terminates.
//!
//! Failures are only logged. A failing or panicking release never stops the
//! remaining ones and never reaches the exiting process.

use crate::fs::Filesystem;
use std::collections::BTreeMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::{debug, warn};

struct Entry {
    path: PathBuf,
    filesystem: Arc<dyn Filesystem>,
    armed: bool,
}

struct Registry {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
    next_id: 0,
    entries: BTreeMap::new(),
});

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A locker's slot in the exit registry. Dropping it releases the lock file
/// if it is still armed.
#[derive(Debug)]
pub(crate) struct Registration {
    id: u64,
}

impl Registration {
    pub(crate) fn new(path: PathBuf, filesystem: Arc<dyn Filesystem>) -> Self {
        install();

        let mut reg = registry();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.entries.insert(
            id,
            Entry {
                path,
                filesystem,
                armed: false,
            },
        );
        Self { id }
    }

    pub(crate) fn arm(&self) {
        self.set_armed(true);
    }

    pub(crate) fn disarm(&self) {
        self.set_armed(false);
    }

    fn set_armed(&self, armed: bool) {
        if let Some(entry) = registry().entries.get_mut(&self.id) {
            entry.armed = armed;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let entry = registry().entries.remove(&self.id);
        if let Some(entry) = entry.filter(|e| e.armed) {
            release(&entry.path, entry.filesystem.as_ref());
        }
    }
}

/// Release every lock file currently held by a live locker in this process.
///
/// Returns how many releases were attempted. Released entries are disarmed,
/// so calling this twice does not unlink anything the second time.
pub fn run_exit_hooks() -> usize {
    let pending: Vec<(PathBuf, Arc<dyn Filesystem>)> = {
        // Another thread may hold the registry while the process exits
        let mut reg = match REGISTRY.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("Lock registry busy at exit, skipping lock file cleanup");
                return 0;
            }
        };
        reg.entries
            .values_mut()
            .filter(|entry| entry.armed)
            .map(|entry| {
                entry.armed = false;
                (entry.path.clone(), Arc::clone(&entry.filesystem))
            })
            .collect()
    };

    for (path, filesystem) in &pending {
        release(path, filesystem.as_ref());
    }
    pending.len()
}

fn release(path: &Path, filesystem: &dyn Filesystem) {
    match panic::catch_unwind(AssertUnwindSafe(|| filesystem.remove(path))) {
        Ok(Ok(())) => debug!("Lock file removed: {}", path.display()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Lock file already removed: {}", path.display());
        }
        Ok(Err(e)) => warn!(
            "Failed to remove lock file {} (non-fatal): {}",
            path.display(),
            e
        ),
        Err(_) => warn!("Panic while removing lock file {}", path.display()),
    }
}

#[cfg(unix)]
fn install() {
    use std::sync::Once;

    static INSTALL: Once = Once::new();

    extern "C" fn on_exit() {
        // Unwinding out of an extern "C" fn aborts
        let _ = panic::catch_unwind(run_exit_hooks);
    }

    INSTALL.call_once(|| {
        // SAFETY: `on_exit` is a plain function with no captured state.
        if unsafe { libc::atexit(on_exit) } != 0 {
            warn!("Failed to register lock file cleanup with atexit");
        }
    });
}

#[cfg(not(unix))]
fn install() {}
