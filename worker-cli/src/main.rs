mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use commands::run::RunArgs;
use commands::validate::ValidateArgs;
use logging::LogFormat;

#[derive(Parser)]
#[command(name = "shift-worker")]
#[command(version)]
#[command(about = "Executes shift build graphs and reports progress to the coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter, e.g. `info` or `worker_service=debug`
    #[arg(long, global = true, env = "SHIFT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "SHIFT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a build graph for the configured build
    Run(RunArgs),

    /// Check a build graph file and print its checkpoints
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
