use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CacheOptions, DEFAULT_CACHE_NAME};
use crate::context::ContextOptions;
use crate::remote::ClientOptions;
use crate::snapshots::SnapshotLocation;
use crate::source::ArbitratorOptions;

const DEFAULT_GRAPHQL_URL: &str = "http://localhost:4000/graphql";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub graphql: GraphqlConfig,
  pub snapshots: SnapshotsConfig,
  pub cache: CacheConfig,
  pub recovery: RecoveryConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphqlConfig {
  pub url: String,
  pub timeout_ms: u64,
}

impl Default for GraphqlConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_GRAPHQL_URL.to_string(),
      timeout_ms: 5000,
    }
  }
}

/// Where the published `projects.json`, `profile.json` and `homedata.json` live.
/// `dir` wins when both are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotsConfig {
  pub base_url: Option<String>,
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  /// Structured tier (SQLite). Defaults to `$XDG_DATA_HOME/folio/cache.db`.
  pub path: Option<PathBuf>,
  /// Key-value tier (JSON file). Defaults to `$XDG_DATA_HOME/folio/local-storage.json`.
  pub kv_path: Option<PathBuf>,
  /// Versioned store name; entries under any other name are dropped on open.
  pub name: String,
  pub stale_window_secs: u64,
  pub prune_interval_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      kv_path: None,
      name: DEFAULT_CACHE_NAME.to_string(),
      stale_window_secs: 300,
      prune_interval_secs: 3600,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
  pub settle_delay_ms: u64,
  pub retry_interval_secs: u64,
  /// Reachability probe cadence for the connectivity signal.
  pub probe_interval_secs: u64,
}

impl Default for RecoveryConfig {
  fn default() -> Self {
    Self {
      settle_delay_ms: 1000,
      retry_interval_secs: 60,
      probe_interval_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  pub level: String,
  /// Directory for daily-rolling log files; console only when unset.
  pub dir: Option<PathBuf>,
  pub json: bool,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      dir: None,
      json: false,
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to built-in defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./folio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/folio/config.yaml
  ///
  /// Environment overrides are applied last.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("folio.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("folio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// FOLIO_GRAPHQL_URL and FOLIO_STATIC_DATA_URL take precedence over the file.
  fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("FOLIO_GRAPHQL_URL").filter(|v| !v.is_empty()) {
      self.graphql.url = url;
    }
    if let Some(url) = var("FOLIO_STATIC_DATA_URL").filter(|v| !v.is_empty()) {
      self.snapshots.base_url = Some(url);
    }
  }

  pub fn client_options(&self) -> ClientOptions {
    ClientOptions {
      url: self.graphql.url.clone(),
      timeout: Duration::from_millis(self.graphql.timeout_ms),
    }
  }

  pub fn snapshot_location(&self) -> SnapshotLocation {
    match (&self.snapshots.dir, &self.snapshots.base_url) {
      (Some(dir), _) => SnapshotLocation::Dir(dir.clone()),
      (None, Some(url)) => SnapshotLocation::Http(url.clone()),
      (None, None) => SnapshotLocation::None,
    }
  }

  pub fn cache_options(&self) -> CacheOptions {
    let data_dir = dirs::data_dir()
      .unwrap_or_else(|| PathBuf::from("."))
      .join("folio");

    CacheOptions {
      enabled: self.cache.enabled,
      path: self
        .cache
        .path
        .clone()
        .unwrap_or_else(|| data_dir.join("cache.db")),
      kv_path: self
        .cache
        .kv_path
        .clone()
        .unwrap_or_else(|| data_dir.join("local-storage.json")),
      name: self.cache.name.clone(),
      stale_window: chrono::Duration::seconds(self.cache.stale_window_secs as i64),
    }
  }

  pub fn arbitrator_options(&self) -> ArbitratorOptions {
    ArbitratorOptions {
      stale_window: chrono::Duration::seconds(self.cache.stale_window_secs as i64),
      settle_delay: Duration::from_millis(self.recovery.settle_delay_ms),
      retry_interval: Duration::from_secs(self.recovery.retry_interval_secs.max(1)),
    }
  }

  pub fn context_options(&self) -> ContextOptions {
    ContextOptions {
      arbitrator: self.arbitrator_options(),
      prune_interval: (self.cache.enabled && self.cache.prune_interval_secs > 0)
        .then(|| Duration::from_secs(self.cache.prune_interval_secs)),
      project_type: None,
    }
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.recovery.probe_interval_secs.max(1))
  }
}
