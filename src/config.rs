/// Configuration management for findx
///
/// findx stores configuration in ~/.findx/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::file_types::FileTypeGroups;

/// findx configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backup settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// Edit history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Traversal and matching settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Line editing settings
    #[serde(default)]
    pub edit: EditConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File-type group overrides (group name -> extensions)
    #[serde(default)]
    pub file_types: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Custom backup directory
    #[serde(default)]
    pub backup_dir: Option<String>,

    /// Maximum percentage of free space a single snapshot may use
    #[serde(default = "default_max_disk_usage_percent")]
    pub max_disk_usage_percent: f64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: None,
            max_disk_usage_percent: default_max_disk_usage_percent(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Custom history directory
    #[serde(default)]
    pub history_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Files above this size are skipped as unreadable
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Stop traversal after this many eligible files
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Default result cap for searches
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Default number of context lines around a match
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Worker threads for per-file work (0 = one per CPU)
    #[serde(default)]
    pub workers: usize,

    /// Per-file matching time budget in milliseconds
    #[serde(default = "default_file_timeout_ms")]
    pub file_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            max_files: default_max_files(),
            max_results: default_max_results(),
            context_lines: default_context_lines(),
            workers: 0,
            file_timeout_ms: default_file_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditConfig {
    /// Snapshot files before line edits and restores
    #[serde(default = "default_make_backup")]
    pub make_backup: bool,

    /// Directories direct edits and restores must stay inside (empty = anywhere)
    #[serde(default)]
    pub allowed_roots: Vec<String>,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            make_backup: default_make_backup(),
            allowed_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write debug logs to ~/.findx/findx.log
    #[serde(default)]
    pub debug: bool,

    /// Custom log directory
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default functions for serde
fn default_max_disk_usage_percent() -> f64 { 60.0 }
fn default_max_file_size_bytes() -> u64 { 1024 * 1024 }
fn default_max_files() -> usize { 100_000 }
fn default_max_results() -> usize { crate::query::DEFAULT_MAX_RESULTS }
fn default_context_lines() -> usize { crate::query::DEFAULT_CONTEXT_LINES }
fn default_file_timeout_ms() -> u64 { 5_000 }
fn default_make_backup() -> bool { true }

impl Config {
    /// Point every piece of on-disk state (backups, history, logs) under `dir`
    pub fn with_state_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.backup.backup_dir = Some(dir.join("backups").display().to_string());
        self.history.history_dir = Some(dir.join("history").display().to_string());
        self.logging.log_dir = Some(dir.display().to_string());
        self
    }

    pub fn backup_dir(&self) -> Result<PathBuf> {
        match &self.backup.backup_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(state_dir()?.join("backups")),
        }
    }

    pub fn history_dir(&self) -> Result<PathBuf> {
        match &self.history.history_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(state_dir()?.join("history")),
        }
    }

    pub fn log_dir(&self) -> Result<PathBuf> {
        match &self.logging.log_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => state_dir(),
        }
    }

    /// Built-in file-type groups with the `[file_types]` overrides applied
    pub fn file_type_groups(&self) -> FileTypeGroups {
        FileTypeGroups::with_overrides(&self.file_types)
    }
}

/// Root of findx's on-disk state (~/.findx)
pub fn state_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home_dir.join(".findx"))
}

/// Get the configuration file path
pub fn config_file_path() -> Result<PathBuf> {
    let config_dir = state_dir()?;
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    Ok(config_dir.join("config.toml"))
}

/// Get the default configuration file content with comments
fn get_default_config_content() -> &'static str {
    r#"# findx Configuration File
#
# This file controls default behavior for findx. Values passed by the calling
# tool layer override these defaults.

[backup]
# Custom backup directory (optional, default: ~/.findx/backups/)
#backup_dir = "/mnt/backups/findx"

# Maximum percentage of free space a single snapshot may use (default: 60)
max_disk_usage_percent = 60

[history]
# Custom history directory (optional, default: ~/.findx/history/)
#history_dir = "/var/lib/findx/history"

[search]
# Files larger than this are skipped and reported as unreadable (default: 1 MiB)
max_file_size_bytes = 1048576

# Stop walking after this many eligible files (default: 100000)
max_files = 100000

# Default cap on match records per search (default: 1000)
max_results = 1000

# Lines of context around each match (default: 2)
context_lines = 2

# Worker threads for per-file work, 0 = one per CPU (default: 0)
workers = 0

# Per-file matching budget in milliseconds (default: 5000)
file_timeout_ms = 5000

[edit]
# Snapshot files before line edits (default: true)
make_backup = true

# Restrict line edits and restores to these directories (default: no restriction)
#allowed_roots = ["/home/me/projects"]

[logging]
# Write debug logs to ~/.findx/findx.log (default: false)
debug = false

[file_types]
# Override or add file-type groups, e.g.
#code = ["rs", "go", "zig"]
"#
}

/// Save the default commented configuration file
pub fn save_default_config() -> Result<()> {
    save_default_config_to(&config_file_path()?)
}

/// Write the commented default configuration to `config_path`
pub fn save_default_config_to(config_path: &Path) -> Result<()> {
    fs::write(config_path, get_default_config_content())
        .with_context(|| format!("Failed to write default config file: {}", config_path.display()))?;

    Ok(())
}

/// Load configuration from file, creating default if needed
///
/// If the config file doesn't exist, creates it with defaults and returns them.
/// If the config file is malformed, recreates it with defaults.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file_path()?)
}

/// Same as [`load_config`], against an explicit file
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        save_default_config_to(config_path)?;
    }

    let config_str = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config: Config = match toml::from_str(&config_str) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Malformed config {}, restoring defaults: {}", config_path.display(), e);
            save_default_config_to(config_path)?;
            return Ok(Config::default());
        }
    };

    validate_config(&config)?;
    Ok(config)
}

/// Parse configuration from a TOML string without touching the disk
pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_file_path()?)
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let config_str = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;

    fs::write(config_path, config_str)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    Ok(())
}

/// Validate configuration values
pub fn validate_config(config: &Config) -> Result<()> {
    let percent = config.backup.max_disk_usage_percent;
    if !(0.0..=100.0).contains(&percent) {
        anyhow::bail!("Invalid max_disk_usage_percent: {} (must be 0-100)", percent);
    }

    if config.search.max_file_size_bytes == 0 {
        anyhow::bail!("Invalid max_file_size_bytes: 0 (must be positive)");
    }

    if config.search.max_files == 0 {
        anyhow::bail!("Invalid max_files: 0 (must be positive)");
    }

    if config.search.max_results == 0 {
        anyhow::bail!("Invalid max_results: 0 (must be positive)");
    }

    if config.search.context_lines > crate::query::MAX_CONTEXT_LINES {
        anyhow::bail!(
            "Invalid context_lines: {} (max {})",
            config.search.context_lines,
            crate::query::MAX_CONTEXT_LINES
        );
    }

    if config.search.file_timeout_ms == 0 {
        anyhow::bail!("Invalid file_timeout_ms: 0 (must be positive)");
    }

    for (group, exts) in &config.file_types {
        if exts.is_empty() {
            anyhow::bail!("Invalid file_types.{}: group has no extensions", group);
        }
    }

    Ok(())
}
