mod bootstrap;
mod commands;

use anyhow::Result;
use clap::Parser;
use loanstats_core::settings::{Command, Settings};

fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level())?;

    tracing::debug!("loanstats v{} starting", env!("CARGO_PKG_VERSION"));

    match &settings.command {
        Command::Aggregate(args) => commands::aggregate(args),
        Command::Inspect(args) => commands::inspect(args),
        Command::Top(args) => commands::top(args),
    }
}
