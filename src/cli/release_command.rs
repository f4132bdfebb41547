use stalelock::{Locker, Result};
use std::path::Path;

pub fn execute_release(path: &Path, quiet: bool) -> Result<i32> {
    Locker::with_defaults(path).unlock_blocking()?;

    if !quiet {
        eprintln!("Lock released: {}", path.display());
    }
    Ok(0)
}
