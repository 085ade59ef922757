//! CLI for the RWL collection loader.

mod commands;
mod permission;
mod prompt;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rwl_core::config;
use std::path::PathBuf;

use commands::{run_cancel, run_id, run_load, run_ping, LoadArgs};

/// Top-level CLI for the RWL collection loader.
#[derive(Debug, Parser)]
#[command(name = "rwl")]
#[command(about = "RWL: load web archive collections through a background worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Load a collection and follow its progress until it completes or fails.
    Load {
        /// Source locator (https://, s3://, googledrive://, ipfs://, file://, ...).
        locator: String,

        /// Collection name. Defaults to the id derived from the locator.
        #[arg(long)]
        name: Option<String>,

        /// Worker socket path (overrides config).
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Alternate URL the worker should fetch the data from.
        #[arg(long, value_name = "URL")]
        load_url: Option<String>,

        /// Extra collection config as a JSON object.
        #[arg(long, value_name = "JSON")]
        extra_config: Option<String>,

        /// Ask the worker for a full import instead of on-demand loading.
        #[arg(long)]
        full_import: bool,
    },

    /// Ask the worker to stop loading a collection.
    Cancel {
        /// Collection name.
        name: String,

        /// Worker socket path (overrides config).
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Send a keepalive ping to the worker.
    Ping {
        /// Worker socket path (overrides config).
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Print the collection id derived from a locator.
    Id {
        /// Source locator.
        locator: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Id { locator } = &cli.command {
            run_id(locator);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Load {
                locator,
                name,
                socket,
                load_url,
                extra_config,
                full_import,
            } => {
                let args = LoadArgs {
                    locator,
                    name,
                    socket,
                    load_url,
                    extra_config,
                    full_import,
                };
                run_load(&cfg, args).await?;
            }
            CliCommand::Cancel { name, socket } => run_cancel(&cfg, &name, socket).await?,
            CliCommand::Ping { socket } => run_ping(&cfg, socket).await?,
            CliCommand::Id { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
