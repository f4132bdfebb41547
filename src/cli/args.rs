use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stalelock",
    version,
    about = "Advisory cross-process locking through sentinel files",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether a live lock file exists (exit 2 when locked)
    Status {
        /// Lock file path
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Age after which a lock file is ignored (e.g., "15s", "500ms")
        #[arg(long, value_name = "DURATION", default_value = "15s")]
        stale_after: String,
    },

    /// Delete a lock file (succeeds if it is already gone)
    Release {
        /// Lock file path
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Hold the lock while running a command, keeping it fresh until it exits
    Run {
        /// Lock file path
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Age after which a lock file is ignored; refreshed while the command runs
        #[arg(long, value_name = "DURATION", default_value = "15s")]
        stale_after: String,

        /// Retries against a live lock before giving up
        #[arg(long, value_name = "N", default_value_t = stalelock::lock::DEFAULT_MAX_RETRIES)]
        retries: u32,

        /// Upper bound for the delay between retries
        #[arg(long, value_name = "DURATION", default_value = "500ms")]
        interval: String,

        /// Command and arguments to run
        #[arg(value_name = "COMMAND", required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
}
