mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use chunkline::config::ChunklineConfig;
use chunkline::logging;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = ChunklineConfig::load(cli.config.as_deref())?;
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(max_retries) = cli.max_retries {
        config.max_chunk_retries = max_retries;
    }

    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    logging::init(level);
    debug!(?config, "configuration loaded");

    let success = match cli.command {
        Command::Import {
            file,
            people_db,
            run_id,
        } => commands::import(&config, &file, &people_db, run_id).await?,
        Command::History { limit } => {
            commands::history(&config, limit)?;
            true
        }
        Command::Demo => commands::demo(&config).await?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
