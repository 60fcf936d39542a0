use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use spindle_host::Value;
use tracing::info;

/// Example config written by `spindle --init`
pub const EXAMPLE_CONFIG: &str = r#"# Spindle Configuration

# Global signals created at startup; scripts find them by name
signals = ["event"]

[scheduler]
tick_rate_hz = 60
exit_when_idle = false
# 0 runs until Ctrl+C
max_runtime_secs = 0

[scripting]
enabled = true
# script_dir = "scripts"

# [scripting.config.some_script]
# enabled = false

[logging]
file = false

[[startup_fires]]
signal = "event"
args = [7, 8, "Hey there"]

[[startup_fires]]
signal = "event"
args = [2, 1, "Hello thar"]
"#;

#[derive(Debug)]
pub enum ConfigLoadError {
    NotFound,
    ParseError(String),
    IoError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::NotFound => write!(f, "Config file not found"),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::IoError(msg) => write!(f, "IO error reading config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

/// Project directories for config, data and logs
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "spindle")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpindleConfig {
    /// Names of the global signals created before any script runs
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub scripting: ScriptingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fires issued by the host once every script has started
    #[serde(default)]
    pub startup_fires: Vec<FireConfig>,
}

fn default_signals() -> Vec<String> {
    vec!["event".to_string()]
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            signals: default_signals(),
            scheduler: SchedulerConfig::default(),
            scripting: ScriptingConfig::default(),
            logging: LoggingConfig::default(),
            startup_fires: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How many times per second `update` runs
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,

    /// Stop once no task is waiting on a delay
    #[serde(default)]
    pub exit_when_idle: bool,

    /// Stop after this many seconds; 0 means never
    #[serde(default)]
    pub max_runtime_secs: u64,
}

fn default_tick_rate() -> u32 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            exit_when_idle: false,
            max_runtime_secs: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn max_runtime(&self) -> Option<Duration> {
        (self.max_runtime_secs > 0).then(|| Duration::from_secs(self.max_runtime_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptingConfig {
    /// Whether scripts are loaded at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Directory containing scripts (default: <data dir>/scripts)
    #[serde(default)]
    pub script_dir: Option<PathBuf>,

    /// Per-script configuration (script ID -> config values)
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            script_dir: None,
            config: HashMap::new(),
        }
    }
}

impl ScriptingConfig {
    /// Get the script directory path (use provided or default)
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(|| {
            project_dirs()
                .map(|d| d.data_dir().join("scripts"))
                .unwrap_or_else(|| PathBuf::from("scripts"))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to <data dir>/logs
    #[serde(default)]
    pub file: bool,
}

/// One fire issued by the host at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireConfig {
    pub signal: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl SpindleConfig {
    pub fn config_path() -> PathBuf {
        project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("spindle.toml"))
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Write [`EXAMPLE_CONFIG`] to `path`, creating parent directories
    pub fn write_example(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Created example config at {}", path.display());
        Ok(())
    }
}
