//! Chook CLI binary entry point.
//!
//! Parses command-line arguments with clap, prunes old log files, sets up
//! tracing and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Clean old logs (best-effort, before tracing is initialized).
    logging::cleanup_old_logs(cli.log_root());

    let _guard = logging::init_tracing(cli.log_root(), cli.file_log_command())?;

    cli.run().await
}
