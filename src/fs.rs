//! Filesystem operations the locker depends on.
//!
//! The locker only needs an exclusive create, a stat for the modification
//! time, an unlink, and an mtime bump for long-lived holders. They are kept behind a trait so
//! callers can point a [`Locker`](crate::Locker) at something other than the
//! local disk.

use filetime::FileTime;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

pub trait Filesystem: Send + Sync {
    /// Create `path` only if it does not exist yet and write `contents` to it.
    ///
    /// Must fail with [`io::ErrorKind::AlreadyExists`] when the file is
    /// present, and must be atomic: two callers can never both succeed.
    fn create_exclusive(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Last modification time of `path`.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Unlink `path`.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Set the modification time of an existing `path` to now.
    fn touch(&self, path: &Path) -> io::Result<()>;
}

/// The local filesystem through `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn create_exclusive(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut opts = OpenOptions::new();
        // O_CREAT | O_EXCL, which also refuses to follow a symlink at `path`
        opts.write(true).create_new(true);

        let mut file = opts.open(path)?;
        // Content is informational; the lock is held once the open succeeded
        if let Err(e) = file.write_all(contents) {
            tracing::debug!(
                "Failed to write holder id to {} (lock still held): {}",
                path.display(),
                e
            );
        }
        Ok(())
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        filetime::set_file_mtime(path, FileTime::now())
    }
}

/// Identifier written into a freshly created lock file.
pub(crate) fn holder_id() -> String {
    format!(
        "{}\n{}\n",
        std::process::id(),
        chrono::Utc::now().to_rfc3339()
    )
}
