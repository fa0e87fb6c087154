//! Configuration view and validation commands: `phasey config`.

use anyhow::Result;

use phasey::config::{CONFIG_FILE, PhaseyConfig, PhaseyToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &PhaseyConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Phasey Configuration");
            println!("====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No phasey.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[world]");
            match &toml.world.path {
                Some(path) => println!("  path = \"{}\"", path.display()),
                None => println!("  path = (default)"),
            }
            println!();
            println!("[merge]");
            println!("  strategy = \"{}\"", toml.merge.strategy);
            println!();
            println!("[logging]");
            match &toml.logging.level {
                Some(level) => println!("  level = \"{}\"", level),
                None => println!("  level = (default)"),
            }
            println!("  json = {}", toml.logging.json);
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  world = \"{}\"", config.world_path().display());
            println!(
                "  log_level = \"{}\"",
                config.log_level().unwrap_or_else(|| "warn".to_string())
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No phasey.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = PhaseyToml::load(&config_path)?.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("phasey.toml already exists at {}", config_path.display());
                return Ok(());
            }
            PhaseyToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }

    Ok(())
}
