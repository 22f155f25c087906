//! User configuration (`~/.config/veritech/config.toml`)
//!
//! Every key is optional. CLI flags override the file; the file overrides
//! the built-in defaults.

use anyhow::{Context, Result};
use intelligence::EngineOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default snapshot location when neither the flag nor the file names one
const DEFAULT_SNAPSHOT: &str = "~/.local/state/veritech/graph.json";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("veritech"))
}

/// Get the config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parallel workers per topological layer
    pub jobs: usize,
    /// Command timeout in seconds; 0 disables it
    pub command_timeout_secs: u64,
    /// Docker CLI used by the dockerImage component
    pub docker_binary: String,
    /// Graph snapshot path, tilde-expanded
    pub snapshot: Option<String>,
    /// Prefix of temporary credential directories
    pub staging_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineOptions::default();
        Self {
            jobs: engine.jobs,
            command_timeout_secs: engine.command_timeout.map_or(0, |t| t.as_secs()),
            docker_binary: "docker".to_string(),
            snapshot: None,
            staging_prefix: engine.staging_prefix,
        }
    }
}

impl Config {
    /// Load the user config, or defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the snapshot path: CLI flag, then config, then default
    pub fn snapshot_path(&self, cli_override: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_override {
            return expand(&path.to_string_lossy());
        }
        expand(self.snapshot.as_deref().unwrap_or(DEFAULT_SNAPSHOT))
    }

    /// Engine options with CLI overrides applied
    pub fn engine_options(&self, jobs: Option<usize>, timeout_secs: Option<u64>) -> EngineOptions {
        let timeout = timeout_secs.unwrap_or(self.command_timeout_secs);
        EngineOptions {
            jobs: jobs.unwrap_or(self.jobs).max(1),
            command_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            staging_prefix: self.staging_prefix.clone(),
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
