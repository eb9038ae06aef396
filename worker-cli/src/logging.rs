// Logging setup for the worker binary

use clap::ValueEnum;
use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global subscriber. `level` accepts any `EnvFilter` directive,
/// e.g. `info` or `worker_service=debug,info`.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level '{}'", level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| eyre!("failed to install logger: {}", e))
}
