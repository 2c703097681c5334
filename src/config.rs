//! Configuration: application paths and timing parameters.
//!
//! Timing values used to be global constants; they are now passed
//! explicitly into the flatteners as a [`TimingConfig`].

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name inside the config directory.
pub const CONFIG_FILE: &str = "comme.json";
/// Default store file name inside the data directory.
pub const STORE_FILE: &str = "comme_store.json";
/// Default log file name inside the data directory.
pub const LOG_FILE: &str = "comme.log";

/// Timing parameters for flattening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Floor for frames with no duration of their own (ms).
    pub min_frame_duration_ms: i32,
    /// Display time per word of text (ms).
    pub word_duration_ms: i32,
    /// Audio items allowed on one frame.
    pub max_audio_items: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_frame_duration_ms: 2500,
            word_duration_ms: 200,
            max_audio_items: 3,
        }
    }
}

impl TimingConfig {
    /// Load `comme.json` from the config directory, or defaults if absent.
    pub fn load(paths: &PathConfig) -> Result<Self> {
        Self::from_file(&config_file(CONFIG_FILE, paths))
    }

    /// Read from a JSON file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No timing config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        info!("Loaded timing config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, min_frame_duration_ms: Option<i32>, word_duration_ms: Option<i32>) -> Self {
        if let Some(v) = min_frame_duration_ms {
            self.min_frame_duration_ms = v.max(0);
        }
        if let Some(v) = word_duration_ms {
            self.word_duration_ms = v.max(0);
        }
        self
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (COMME_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var("COMME_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. COMME_CONFIG_DIR environment variable
/// 3. Local folder IF any comme files exist there
/// 4. Platform config directory from dirs-next (e.g. ~/.config/comme)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir).join(name)
}

/// Path to a data file (store, logs). Same priority as [`config_file`],
/// falling back to the platform data directory (e.g. ~/.local/share/comme).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir).join(name)
}

/// Create config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir);
    let data_dir = resolve_dir(config, dirs_next::data_dir);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    [CONFIG_FILE, STORE_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_files(&current_dir) {
            return current_dir;
        }
    }
    if let Some(dir) = platform() {
        return dir.join("comme");
    }
    PathBuf::from(".")
}
