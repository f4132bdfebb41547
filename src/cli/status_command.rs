use stalelock::utils::parse_duration;
use stalelock::{LockConfig, Locker, Result};
use std::path::Path;

pub fn execute_status(path: &Path, stale_after: &str, quiet: bool) -> Result<i32> {
    let config = LockConfig::default().with_stale_after(parse_duration(stale_after)?);
    let locker = Locker::new(path, config);

    let locked = locker.locked_blocking()?;
    if !quiet {
        println!("{}", if locked { "locked" } else { "unlocked" });
    }

    Ok(if locked { 2 } else { 0 })
}
