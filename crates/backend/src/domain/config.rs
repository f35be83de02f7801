//! Configuration for searchlane
//!
//! Config priority: `$SEARCHLANE_CONFIG` > user (~/.config/searchlane/config.toml) > defaults

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::actor::DEFAULT_LANE_CAPACITY;

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "SEARCHLANE_CONFIG";

/// Environment variable consulted when a client has no `api_key`
pub const API_KEY_ENV: &str = "MEILI_API_KEY";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

// ============================================================================
// Worker Pool Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
  /// Worker slots per index (0 = one per CPU)
  /// Default: 4
  pub workers: usize,

  /// Buffered requests per lane before senders wait
  /// Default: 256
  pub lane_capacity: usize,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      workers: 4,
      lane_capacity: DEFAULT_LANE_CAPACITY,
    }
  }
}

impl PoolConfig {
  /// Worker count with `0` resolved to the number of CPUs
  pub fn resolved_workers(&self) -> usize {
    if self.workers == 0 {
      num_cpus::get().max(1)
    } else {
      self.workers
    }
  }
}

// ============================================================================
// Task Polling Configuration
// ============================================================================

/// How engine tasks are awaited after a mutation is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,

  /// Give up waiting after this many seconds (the task keeps running remotely)
  #[serde(default = "default_task_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
  50
}
fn default_task_timeout_secs() -> u64 {
  30
}

impl Default for TaskConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: default_poll_interval_ms(),
      timeout_secs: default_task_timeout_secs(),
    }
  }
}

impl TaskConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_millis(self.poll_interval_ms.max(1))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// `RUST_LOG` takes precedence when set.
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

// ============================================================================
// Host & Index Configuration
// ============================================================================

/// One search host and the indexes opened on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
  /// Registry key for this host
  pub tag: String,

  /// Base URL, e.g. `http://127.0.0.1:7700`
  pub host: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_key: Option<String>,

  #[serde(default = "default_request_timeout_secs")]
  pub timeout_secs: u64,

  /// Overrides `pool.workers` for this host's indexes
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workers: Option<usize>,

  #[serde(default)]
  pub indexes: Vec<IndexConfig>,
}

fn default_request_timeout_secs() -> u64 {
  10
}

impl ClientConfig {
  pub fn new(tag: impl Into<String>, host: impl Into<String>) -> Self {
    Self {
      tag: tag.into(),
      host: host.into(),
      api_key: None,
      timeout_secs: default_request_timeout_secs(),
      workers: None,
      indexes: Vec::new(),
    }
  }

  /// Configured key, falling back to `$MEILI_API_KEY`
  pub fn resolved_api_key(&self) -> Option<String> {
    self
      .api_key
      .clone()
      .filter(|key| !key.is_empty())
      .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }

  /// Pool settings for this host, applying the per-host worker override
  pub fn pool(&self, base: &PoolConfig) -> PoolConfig {
    PoolConfig {
      workers: self.workers.unwrap_or(base.workers),
      lane_capacity: base.lane_capacity,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
  pub name: String,

  #[serde(default = "default_primary_key")]
  pub primary_key: String,

  #[serde(default)]
  pub filterable_fields: Vec<String>,

  /// Create the index on open (an existing index is fine)
  #[serde(default = "default_true")]
  pub create_index: bool,

  /// Push `filterable_fields` to the engine on open
  #[serde(default = "default_true")]
  pub update_fields: bool,
}

fn default_primary_key() -> String {
  "id".to_string()
}
fn default_true() -> bool {
  true
}

impl IndexConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      primary_key: default_primary_key(),
      filterable_fields: Vec::new(),
      create_index: true,
      update_fields: true,
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub pool: PoolConfig,
  pub tasks: TaskConfig,
  pub log: LogConfig,
  pub clients: Vec<ClientConfig>,
}

impl Config {
  /// Parse a config file, failing on unreadable or malformed input
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load the explicit or user config, or defaults when neither exists
  pub fn load() -> Result<Self, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV)
      && !path.is_empty()
    {
      return Self::load_from(Path::new(&path));
    }

    if let Some(path) = Self::user_config_path()
      && path.exists()
    {
      return Self::load_from(&path);
    }

    Ok(Self::default())
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("searchlane").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("searchlane").join("config.toml"))
  }

  pub fn client(&self, tag: &str) -> Option<&ClientConfig> {
    self.clients.iter().find(|client| client.tag == tag)
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    format!(
      r#"# searchlane configuration
# Place in ~/.config/searchlane/config.toml or point $SEARCHLANE_CONFIG at it

# ============================================================================
# Worker Pool
# ============================================================================

[pool]
# Worker slots per index; mutations for one document id always share a slot
# 0 = one per CPU
workers = 4

# Requests buffered per slot before callers wait
lane_capacity = {lane_capacity}

# ============================================================================
# Engine Tasks
# ============================================================================

[tasks]
# How often a pending task is polled
poll_interval_ms = {poll}

# Stop waiting for a task after this long
timeout_secs = {timeout}

# ============================================================================
# Logging
# ============================================================================

[log]
# off, error, warn, info, debug, trace (RUST_LOG overrides)
level = "info"

# ============================================================================
# Hosts
# ============================================================================

[[clients]]
tag = "local"
host = "http://127.0.0.1:7700"
# Falls back to $MEILI_API_KEY
# api_key = "masterKey"
timeout_secs = 10
# workers = 8

[[clients.indexes]]
name = "movies"
primary_key = "id"
filterable_fields = ["genre", "year"]
create_index = true
update_fields = true
"#,
      lane_capacity = DEFAULT_LANE_CAPACITY,
      poll = default_poll_interval_ms(),
      timeout = default_task_timeout_secs(),
    )
  }
}
