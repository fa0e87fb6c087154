//! CLI command implementations.
//!
//! | Module   | Commands handled                                          |
//! |----------|-----------------------------------------------------------|
//! | `world`  | `World`                                                   |
//! | `phase`  | `List`, `Status`, `Configure`, `Activate`, `Advance`, ... |
//! | `config` | `Config`                                                  |

pub mod config;
pub mod phase;
pub mod world;

pub use config::cmd_config;
pub use phase::{
    ConfigureEdits, cmd_activate, cmd_advance, cmd_configure, cmd_deactivate, cmd_list,
    cmd_status,
};
pub use world::cmd_world;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use phasey::config::PhaseyConfig;
use phasey::controller::PhaseController;
use phasey::notify::ConsoleNotifier;
use phasey::store::MemoryWorld;

/// A loaded world file plus the controller driving it.
pub struct Session {
    pub world: Arc<MemoryWorld>,
    pub world_path: PathBuf,
    pub controller: PhaseController,
}

impl Session {
    pub fn open(config: &PhaseyConfig) -> Result<Self> {
        let world_path = config.world_path();
        if !world_path.exists() {
            anyhow::bail!(
                "No world file at {}. Run 'phasey world init' first.",
                world_path.display()
            );
        }
        let world = MemoryWorld::load(&world_path)
            .with_context(|| format!("Failed to load world from {}", world_path.display()))?;
        let world = Arc::new(world);
        tracing::debug!(path = %world_path.display(), "loaded world");
        let controller =
            PhaseController::new(world.clone(), world.clone(), Arc::new(ConsoleNotifier))
                .with_strategy(config.merge_strategy());
        Ok(Self {
            world,
            world_path,
            controller,
        })
    }

    pub async fn save(&self) -> Result<()> {
        self.world
            .save(&self.world_path)
            .await
            .with_context(|| format!("Failed to save world to {}", self.world_path.display()))
    }
}
