use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to acquire lock on {path}: file is locked by another process")]
    Conflict { path: PathBuf, source: io::Error },

    #[error("Failed to acquire lock on {path}: still held after {retries} retries")]
    Exhausted {
        path: PathBuf,
        retries: u32,
        source: io::Error,
    },

    #[error("Failed to create lock file {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("Failed to stat lock file {path}: {source}")]
    Stat { path: PathBuf, source: io::Error },

    #[error("Failed to remove lock file {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("Failed to refresh lock file {path}: {source}")]
    Refresh { path: PathBuf, source: io::Error },

    #[error("Invalid duration format '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("Failed to run command '{command}': {source}")]
    CommandFailed { command: String, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl LockError {
    /// True when the failure means another holder owns the lock.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Conflict { .. } | LockError::Exhausted { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_contention() {
            2
        } else {
            1
        }
    }

    /// The underlying filesystem error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            LockError::Conflict { source, .. }
            | LockError::Exhausted { source, .. }
            | LockError::Create { source, .. }
            | LockError::Stat { source, .. }
            | LockError::Remove { source, .. }
            | LockError::Refresh { source, .. }
            | LockError::CommandFailed { source, .. } => Some(source),
            LockError::Io(e) => Some(e),
            LockError::InvalidDuration { .. } | LockError::Other(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
