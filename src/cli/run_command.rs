use stalelock::utils::parse_duration;
use stalelock::{LockConfig, LockError, Locker, Result};
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub fn execute_run(
    path: &Path,
    stale_after: &str,
    retries: u32,
    interval: &str,
    command: &[String],
) -> Result<i32> {
    let (program, program_args) = command
        .split_first()
        .ok_or_else(|| LockError::Other("Command required".to_string()))?;

    let config = LockConfig::default()
        .with_stale_after(parse_duration(stale_after)?)
        .with_max_retries(retries)
        .with_interval(parse_duration(interval)?);
    let locker = Locker::new(path, config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(locker.lock())?;
    debug!("Lock acquired: {}", path.display());

    let status = run_refreshing(&locker, program, program_args);

    // Release before reporting the child's outcome
    if let Err(e) = locker.unlock_blocking() {
        warn!("{}", e);
    }

    let status = status.map_err(|e| LockError::CommandFailed {
        command: program.clone(),
        source: e,
    })?;
    debug!("Command finished: {} ({})", program, status);

    // Killed by a signal
    Ok(status.code().unwrap_or(1))
}

/// Run the child while bumping the lock file's mtime often enough that it
/// never looks stale to other processes.
fn run_refreshing(locker: &Locker, program: &str, args: &[String]) -> io::Result<ExitStatus> {
    let mut child = Command::new(program).args(args).spawn()?;
    let period = refresh_period(locker.config().stale_after);
    let (done, finished) = mpsc::channel::<()>();

    thread::scope(|scope| {
        scope.spawn(move || {
            while let Err(RecvTimeoutError::Timeout) = finished.recv_timeout(period) {
                if let Err(e) = locker.refresh_blocking() {
                    warn!("Lock may be lost: {}", e);
                }
            }
        });

        let status = child.wait();
        // Disconnecting stops the refresher
        drop(done);
        status
    })
}

fn refresh_period(stale_after: Duration) -> Duration {
    (stale_after / 3).max(Duration::from_millis(1))
}
