use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use phasey::config::PhaseyConfig;
use phasey::logging::init_logging;
use phasey::notify::{ConsoleNotifier, Notifier};

mod cmd;

#[derive(Parser)]
#[command(name = "phasey")]
#[command(version, about = "Step a scene folder through its phases on a master scene")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding phasey.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// World file. Overrides PHASEY_WORLD and phasey.toml.
    #[arg(long, global = true)]
    pub world: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and edit the world file
    World {
        #[command(subcommand)]
        command: WorldCommands,
    },
    /// List scene folders and their phase state
    List,
    /// Show the active sequence
    Status,
    /// Edit the phase configuration of a folder
    Configure {
        /// Folder id
        folder: String,
        /// Move a scene: <scene-id>:<delta>, e.g. abc:-1 (repeatable)
        #[arg(long = "move", value_name = "SCENE:DELTA")]
        moves: Vec<String>,
        /// Skip or unskip a scene (repeatable)
        #[arg(long, value_name = "SCENE")]
        toggle_skip: Vec<String>,
        /// Copy phase tokens into the master on each advance
        #[arg(long)]
        merge_tokens: Option<bool>,
        /// Label a phase: <scene-id>=<label> (repeatable)
        #[arg(long = "label", value_name = "SCENE=LABEL")]
        labels: Vec<String>,
        /// Remove a phase label (repeatable)
        #[arg(long, value_name = "SCENE")]
        clear_label: Vec<String>,
        /// Activate the folder after saving
        #[arg(long)]
        activate: bool,
    },
    /// Make a folder the active sequence and apply its first phase
    Activate {
        /// Folder id
        folder: String,
    },
    /// Advance the active sequence by STEPS (negative goes back)
    Advance {
        #[arg(allow_hyphen_values = true, default_value = "1")]
        steps: i64,
    },
    /// Advance one phase
    Next,
    /// Go back one phase
    Prev,
    /// Delete the master scene and clear the active sequence
    Deactivate,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum WorldCommands {
    /// Create an empty world file
    Init {
        /// Overwrite an existing world file
        #[arg(long)]
        force: bool,
    },
    /// Create a scene folder and print its id
    Folder { name: String },
    /// Create a scene and print its id
    Scene {
        name: String,
        /// Parent folder id
        #[arg(long)]
        folder: Option<String>,
        /// Extra field: <key>=<json or text> (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Place a token on a scene and print its id
    Token {
        scene: String,
        name: String,
        #[arg(long, default_value = "0")]
        x: i64,
        #[arg(long, default_value = "0")]
        y: i64,
    },
    /// Present a scene to players
    Present { scene: String },
    /// Point the local view at a scene
    View { scene: String },
    /// Print a document as JSON
    Show { id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default phasey.toml file
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %format!("{e:#}"), "command failed");
        ConsoleNotifier.error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_dir = match cli.config_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = PhaseyConfig::with_cli_args(config_dir, cli.world.clone(), cli.verbose)?;
    init_logging(config.log_level().as_deref(), config.verbose, config.log_json())?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::World { command } => cmd::cmd_world(&config, command.clone()).await?,
        Commands::List => cmd::cmd_list(&config).await?,
        Commands::Status => cmd::cmd_status(&config).await?,
        Commands::Configure {
            folder,
            moves,
            toggle_skip,
            merge_tokens,
            labels,
            clear_label,
            activate,
        } => {
            let edits = cmd::ConfigureEdits {
                moves: moves.clone(),
                toggle_skip: toggle_skip.clone(),
                merge_tokens: *merge_tokens,
                labels: labels.clone(),
                clear_labels: clear_label.clone(),
                activate: *activate,
            };
            cmd::cmd_configure(&config, folder, edits).await?;
        }
        Commands::Activate { folder } => cmd::cmd_activate(&config, folder).await?,
        Commands::Advance { steps } => cmd::cmd_advance(&config, *steps).await?,
        Commands::Next => cmd::cmd_advance(&config, 1).await?,
        Commands::Prev => cmd::cmd_advance(&config, -1).await?,
        Commands::Deactivate => cmd::cmd_deactivate(&config).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
