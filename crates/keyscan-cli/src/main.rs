mod commands;
mod logging;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keyscan",
    version,
    about = "Resumable, rate-limited ordered table backfill"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backfill job, writing batches to stdout as JSON lines
    Run {
        /// Path to job YAML file
        job: PathBuf,
    },
    /// Validate job configuration and connectivity
    Check {
        /// Path to job YAML file
        job: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { job } => commands::run::execute(&job).await,
        Commands::Check { job } => commands::check::execute(&job).await,
    }
}
