//! CLI command definitions using clap.
//!
//! - daemon: scheduler and workers until Ctrl-C
//! - tick / run-now / enqueue: trigger runs
//! - status / cancel: inspect and stop queued runs
//! - approve / reject: act on held replies
//! - seal / keygen: store an encrypted token pair on an integration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Replyr - multi-tenant comment triage and auto-reply dispatcher
#[derive(Parser, Debug)]
#[command(name = "replyr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler and task workers until Ctrl-C
    Daemon {
        /// Override the number of worker loops
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Enqueue one run per enabled integration, then exit
    Tick,

    /// Run the pipeline for one integration inline, bypassing the queue
    RunNow {
        /// Integration ID
        integration: String,
    },

    /// Queue a run for one integration
    Enqueue {
        /// Integration ID
        integration: String,
    },

    /// Show the status of a queued run
    Status {
        /// Task handle returned by enqueue
        task: String,
    },

    /// Cancel a queued or running run
    Cancel {
        /// Task handle returned by enqueue
        task: String,
    },

    /// Send a reply held for approval
    Approve {
        /// Response ID
        response: String,
    },

    /// Discard a reply held for approval
    Reject {
        /// Response ID
        response: String,
    },

    /// Seal REPLYR_ACCESS_TOKEN (and REPLYR_REFRESH_TOKEN if set) onto an integration
    Seal {
        /// Integration ID
        integration: String,
    },

    /// Print a fresh random sealing key
    Keygen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run_now() {
        let cli = Cli::try_parse_from(["replyr", "run-now", "int-1"]).unwrap();
        assert!(matches!(cli.command, Commands::RunNow { ref integration } if integration == "int-1"));
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from(["replyr", "status", "task-1", "-v", "--config", "/tmp/r.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.yml")));
        assert!(matches!(cli.command, Commands::Status { ref task } if task == "task-1"));
    }

    #[test]
    fn test_cli_parse_daemon_workers() {
        let cli = Cli::try_parse_from(["replyr", "daemon", "--workers", "4"]).unwrap();
        assert!(matches!(cli.command, Commands::Daemon { workers: Some(4) }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["replyr"]).is_err());
    }

    #[test]
    fn test_cli_seal_requires_integration() {
        assert!(Cli::try_parse_from(["replyr", "seal"]).is_err());
        let cli = Cli::try_parse_from(["replyr", "seal", "int-1"]).unwrap();
        assert!(matches!(cli.command, Commands::Seal { ref integration } if integration == "int-1"));
    }
}
