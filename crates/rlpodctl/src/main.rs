// rlpod control CLI
// Edit pod manifests and inspect their data

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rlpod_core::RuntimeConfig;

mod pod_commands;

#[derive(Parser)]
#[command(name = "rlpodctl")]
#[command(about = "Reinforcement-learning pod control CLI", version)]
struct Cli {
    /// TOML runtime configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory scanned for pod manifests
    #[arg(long, global = true)]
    pods_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage pod-level actions
    #[command(subcommand)]
    Action(ActionCommands),

    /// Manage training rewards
    #[command(subcommand)]
    Rewards(RewardsCommands),

    /// Inspect pods and their data
    #[command(subcommand)]
    Pod(PodCommands),
}

#[derive(Subcommand)]
enum ActionCommands {
    /// Append an action to the first manifest in the pods directory
    Add {
        /// Action name
        name: String,

        /// Overwrite an existing action without asking
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum RewardsCommands {
    /// Add a default reward for every action
    Add,
}

#[derive(Subcommand)]
enum PodCommands {
    /// Show identity, window, fields, actions and rewards
    Show {
        /// Manifest path; defaults to the first manifest in the pods directory
        path: Option<PathBuf>,
    },

    /// Fetch all data sources and print the merged table as CSV
    Fetch {
        /// Manifest path; defaults to the first manifest in the pods directory
        path: Option<PathBuf>,
    },

    /// Fetch, overlay local state from a CSV file and print the result
    State {
        /// CSV file with a `time` column and fully-qualified field columns
        csv: PathBuf,

        /// Manifest path; defaults to the first manifest in the pods directory
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = RuntimeConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = cli.pods_dir {
        config.pods_dir = dir;
    }

    match cli.command {
        Commands::Action(ActionCommands::Add { name, yes }) => {
            pod_commands::add_action(&config, &name, yes)?;
        }

        Commands::Rewards(RewardsCommands::Add) => {
            pod_commands::add_rewards(&config)?;
        }

        Commands::Pod(PodCommands::Show { path }) => {
            pod_commands::show_pod(&config, path)?;
        }

        Commands::Pod(PodCommands::Fetch { path }) => {
            pod_commands::fetch_pod(&config, path).await?;
        }

        Commands::Pod(PodCommands::State { csv, path }) => {
            pod_commands::overlay_state(&config, &csv, path).await?;
        }
    }

    Ok(())
}
