//! Switchboard - MCP gateway.
//!
//! This is the main entry point for the switchboard CLI.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchboard_util::log::{LogConfig, LogLevel};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(author, version, about = "MCP gateway", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the gateway config file
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (default)
    Serve {
        /// Address to bind to
        #[arg(short, long)]
        address: Option<String>,
        /// Directory holding workspace records
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Require this key on the admin API
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List persisted workspaces
    Workspaces {
        /// Directory holding workspace records
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Print output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_file) =
        switchboard_core::GatewayConfig::load(cli.config.as_deref()).await?;

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::parse(&config.log_level).unwrap_or_default()
    };
    switchboard_util::log::init(LogConfig {
        level,
        ..LogConfig::default()
    });
    if let Some(file) = &config_file {
        tracing::debug!(path = %file.display(), "Using config file");
    }

    match cli.command.unwrap_or(Commands::Serve {
        address: None,
        data_dir: None,
        api_key: None,
    }) {
        Commands::Serve {
            address,
            data_dir,
            api_key,
        } => {
            if let Some(address) = address {
                config.address = address;
            }
            if let Some(dir) = data_dir {
                config.data_dir = Some(dir);
            }
            if let Some(key) = api_key {
                config.api_key = Some(key);
            }
            commands::serve(config).await
        }
        Commands::Workspaces { data_dir, json } => {
            if let Some(dir) = data_dir {
                config.data_dir = Some(dir);
            }
            commands::list_workspaces(&config, json).await
        }
        Commands::Version => {
            commands::print_version();
            Ok(())
        }
    }
}
