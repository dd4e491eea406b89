//! Configuration loading and resolution
//!
//! The host resolves configuration and hands the engine a final
//! [`EngineConfig`]: per-agent directory lists, a machine label, and sync
//! tuning. Directory lists resolve per agent with the precedence
//! environment variable → config file array → built-in default, the env
//! var always winning.
//!
//! The config file lives at `~/.config/convoscope/config.toml`.

use crate::error::{Error, Result};
use crate::registry::{agent_by_type, REGISTRY};
use crate::types::AgentKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// On-disk configuration file shape.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Machine label stored on every session (defaults to the hostname)
    #[serde(default)]
    pub machine: Option<String>,

    /// Per-agent directory overrides, keyed by agent name. Values may be a
    /// single directory or an array.
    #[serde(default)]
    pub agents: HashMap<String, DirList>,

    /// Sync engine tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One directory or several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DirList {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl DirList {
    fn to_vec(&self) -> Vec<PathBuf> {
        match self {
            DirList::One(p) => vec![p.clone()],
            DirList::Many(v) => v.clone(),
        }
    }
}

/// Sync engine tuning knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Watcher quiet window before a changed path is re-synced
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Worker pool size; defaults to the machine's available parallelism
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// User-turn gap above which a branch becomes its own fork session
    #[serde(default = "default_fork_threshold")]
    pub fork_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_in_flight: None,
            fork_threshold: default_fork_threshold(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_fork_threshold() -> usize {
    crate::parsers::claude::FORK_THRESHOLD
}

impl SyncConfig {
    /// Effective worker pool size.
    pub fn workers(&self) -> usize {
        self.max_in_flight.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ConfigFile {
    /// Load configuration from the default path, or defaults when the file
    /// does not exist.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            tracing::info!(path = %config_path.display(), "no config file, using defaults");
            return Ok(ConfigFile::default());
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;
        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoscope")
            .join("config.toml")
    }

    /// Returns the data directory path (for the index database)
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoscope")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoscope")
    }

    /// Returns the index database file path
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("index.db")
    }
}

/// Fully-resolved configuration the engine runs on.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-agent directory lists, in registry order
    pub dirs: Vec<(AgentKind, Vec<PathBuf>)>,
    /// Machine label stored verbatim on every session
    pub machine: String,
    /// Sync tuning
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Resolve directories against the process environment and home dir.
    pub fn resolve(file: &ConfigFile) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::resolve_with(file, &home, |var| std::env::var(var).ok())
    }

    /// Resolution with injectable environment, for tests.
    pub fn resolve_with(
        file: &ConfigFile,
        home: &std::path::Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        for key in file.agents.keys() {
            if agent_by_type(key).is_none() {
                tracing::warn!(key = %key, "unknown agent in [agents] config, ignoring");
            }
        }

        let mut dirs = Vec::with_capacity(REGISTRY.len());
        for spec in REGISTRY {
            let resolved: Vec<PathBuf> = if let Some(value) = env(spec.env_var) {
                vec![PathBuf::from(value)]
            } else if let Some(list) = file.agents.get(spec.config_key) {
                list.to_vec()
            } else {
                spec.default_dirs.iter().map(|d| home.join(d)).collect()
            };
            dirs.push((spec.kind, resolved));
        }

        let machine = file
            .machine
            .clone()
            .or_else(|| env("HOSTNAME"))
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            dirs,
            machine,
            sync: file.sync.clone(),
        }
    }

    /// Directory list for one agent.
    pub fn dirs_for(&self, kind: AgentKind) -> &[PathBuf] {
        self.dirs
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| d.as_slice())
            .unwrap_or(&[])
    }

    /// A single-agent config rooted at one directory, for tests and
    /// targeted re-scans.
    pub fn single(kind: AgentKind, dir: PathBuf, machine: &str) -> Self {
        let mut dirs = Vec::new();
        for spec in REGISTRY {
            if spec.kind == kind {
                dirs.push((spec.kind, vec![dir.clone()]));
            } else {
                dirs.push((spec.kind, Vec::new()));
            }
        }
        Self {
            dirs,
            machine: machine.to_string(),
            sync: SyncConfig::default(),
        }
    }
}
