//! Configuration for the `phasey` CLI, read from `phasey.toml`.
//!
//! Settings are layered file → environment → CLI:
//!
//! ```toml
//! [world]
//! path = "world.json"
//!
//! [merge]
//! strategy = "overwrite"   # or "replace-embedded"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! | Setting          | Environment    | CLI         |
//! |------------------|----------------|-------------|
//! | `world.path`     | `PHASEY_WORLD` | `--world`   |
//! | `logging.level`  | `PHASEY_LOG`   | `--verbose` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::controller::MergeStrategy;

pub const CONFIG_FILE: &str = "phasey.toml";
pub const DEFAULT_WORLD_FILE: &str = "world.json";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSection {
    /// World file, relative to the config directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeSection {
    #[serde(default)]
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default)]
    pub level: Option<String>,
    /// Emit JSON lines instead of text
    #[serde(default)]
    pub json: bool,
}

/// The complete phasey.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseyToml {
    #[serde(default)]
    pub world: WorldSection,
    #[serde(default)]
    pub merge: MergeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl PhaseyToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phasey.toml")
    }

    /// Load `phasey.toml` from `dir`, or defaults if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize phasey.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref level) = self.logging.level
            && !is_valid_level(level)
        {
            warnings.push(format!(
                "Unknown logging level '{}': expected one of {}",
                level,
                LOG_LEVELS.join(", ")
            ));
        }

        if let Some(ref path) = self.world.path
            && path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            warnings.push(format!(
                "World file '{}' does not have a .json extension",
                path.display()
            ));
        }

        warnings
    }
}

fn is_valid_level(level: &str) -> bool {
    LOG_LEVELS.contains(&level.to_lowercase().as_str())
}

/// Resolved configuration: phasey.toml plus environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct PhaseyConfig {
    /// Directory holding phasey.toml
    pub config_dir: PathBuf,
    pub toml: PhaseyToml,
    /// CLI override: world file
    pub cli_world: Option<PathBuf>,
    /// CLI override: verbose logging
    pub verbose: bool,
}

impl PhaseyConfig {
    pub fn new(config_dir: PathBuf) -> Result<Self> {
        let config_dir = config_dir
            .canonicalize()
            .context("Failed to resolve config directory")?;
        let toml = PhaseyToml::load_or_default(&config_dir)?;
        Ok(Self {
            config_dir,
            toml,
            cli_world: None,
            verbose: false,
        })
    }

    pub fn with_cli_args(config_dir: PathBuf, world: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let mut config = Self::new(config_dir)?;
        config.cli_world = world;
        config.verbose = verbose;
        Ok(config)
    }

    /// World file (CLI → `PHASEY_WORLD` → file → `world.json`).
    pub fn world_path(&self) -> PathBuf {
        let path = self
            .cli_world
            .clone()
            .or_else(|| std::env::var_os("PHASEY_WORLD").map(PathBuf::from))
            .or_else(|| self.toml.world.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORLD_FILE));
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }

    /// Configured log filter (`PHASEY_LOG` → file).
    pub fn log_level(&self) -> Option<String> {
        std::env::var("PHASEY_LOG")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.toml.logging.level.clone())
    }

    pub fn log_json(&self) -> bool {
        self.toml.logging.json
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.toml.merge.strategy
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[world]
path = "campaign.json"

[merge]
strategy = "replace-embedded"

[logging]
level = "debug"
json = true
"#;
        let toml = PhaseyToml::parse(content).unwrap();
        assert_eq!(toml.world.path, Some(PathBuf::from("campaign.json")));
        assert_eq!(toml.merge.strategy, MergeStrategy::ReplaceEmbedded);
        assert_eq!(toml.logging.level.as_deref(), Some("debug"));
        assert!(toml.logging.json);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let toml = PhaseyToml::parse("").unwrap();
        assert_eq!(toml.merge.strategy, MergeStrategy::Overwrite);
        assert!(toml.world.path.is_none());
        assert!(!toml.logging.json);
    }

    #[test]
    fn test_invalid_strategy_is_an_error() {
        let err = PhaseyToml::parse("[merge]\nstrategy = \"shuffle\"\n").unwrap_err();
        assert!(err.to_string().contains("phasey.toml"));
    }

    #[test]
    fn test_validate_warns() {
        let toml = PhaseyToml::parse(
            r#"
[world]
path = "world.yaml"

[logging]
level = "loud"
"#,
        )
        .unwrap();
        let warnings = toml.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("loud"));
        assert!(warnings[1].contains("world.yaml"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let mut toml = PhaseyToml::default();
        toml.merge.strategy = MergeStrategy::ReplaceEmbedded;
        toml.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = PhaseyToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.merge.strategy, MergeStrategy::ReplaceEmbedded);
    }

    #[test]
    fn test_world_path_precedence() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var_os("PHASEY_WORLD");
        unsafe { std::env::remove_var("PHASEY_WORLD") };

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[world]\npath = \"file.json\"\n").unwrap();

        let config = PhaseyConfig::new(dir.path().to_path_buf()).unwrap();
        assert!(config.world_path().ends_with("file.json"));

        unsafe { std::env::set_var("PHASEY_WORLD", "env.json") };
        assert!(config.world_path().ends_with("env.json"));

        let config =
            PhaseyConfig::with_cli_args(dir.path().to_path_buf(), Some("cli.json".into()), false)
                .unwrap();
        assert!(config.world_path().ends_with("cli.json"));
        assert!(config.world_path().starts_with(&config.config_dir));

        unsafe { std::env::remove_var("PHASEY_WORLD") };
        if let Some(val) = saved {
            unsafe { std::env::set_var("PHASEY_WORLD", val) };
        }
    }

    #[test]
    fn test_default_world_path() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = std::env::var_os("PHASEY_WORLD");
        unsafe { std::env::remove_var("PHASEY_WORLD") };

        let dir = tempdir().unwrap();
        let config = PhaseyConfig::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(config.world_path(), config.config_dir.join(DEFAULT_WORLD_FILE));

        if let Some(val) = saved {
            unsafe { std::env::set_var("PHASEY_WORLD", val) };
        }
    }
}
