mod args;
mod release_command;
mod run_command;
mod status_command;

pub use args::{Args, Command};
use stalelock::Result;

/// Run the parsed command, returning the process exit code.
pub fn run(args: Args) -> Result<i32> {
    let quiet = args.quiet;
    match args.command {
        Command::Status { path, stale_after } => {
            status_command::execute_status(&path, &stale_after, quiet)
        }
        Command::Release { path } => release_command::execute_release(&path, quiet),
        Command::Run {
            path,
            stale_after,
            retries,
            interval,
            command,
        } => run_command::execute_run(&path, &stale_after, retries, &interval, &command),
    }
}
