//! Cache tier implementations: SQLite structured store, JSON-file key-value
//! store, and an in-memory tier.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::CacheError;
use crate::model::{DataSnapshot, SourceKind};

use super::traits::{CacheEntry, CacheTier};

/// Default name of the versioned structured cache.
pub const DEFAULT_CACHE_NAME: &str = "portfolio-data-v1";

/// Key prefix used by the key-value tier.
const KV_PREFIX: &str = "portfolio-data:";

/// Default key-value quota, matching typical browser local storage.
pub const DEFAULT_KV_QUOTA: usize = 5 * 1024 * 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SQLite structured tier
// ============================================================================

/// Named, versioned structured cache backed by SQLite.
///
/// Rows written under any other cache name are dropped on open, the same way
/// an activating service worker deletes caches from older versions.
pub struct SqliteTier {
  conn: Mutex<Connection>,
  cache_name: String,
  label: String,
}

/// Schema for the snapshot cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_cache (
    cache_name TEXT NOT NULL,
    key TEXT NOT NULL,
    payload BLOB NOT NULL,
    source TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, key)
);

CREATE INDEX IF NOT EXISTS idx_snapshot_cache_fetched
    ON snapshot_cache(cache_name, fetched_at);
"#;

impl SqliteTier {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path, cache_name: &str) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| CacheError::WriteFailure {
        tier: "sqlite".to_string(),
        reason: format!("failed to create cache directory: {}", e),
      })?;
    }

    let conn = Connection::open(path).map_err(|e| CacheError::ReadFailure {
      tier: "sqlite".to_string(),
      reason: format!("failed to open cache database at {}: {}", path.display(), e),
    })?;

    Self::with_connection(conn, cache_name)
  }

  /// Private in-memory database.
  pub fn open_in_memory(cache_name: &str) -> Result<Self, CacheError> {
    let conn = Connection::open_in_memory().map_err(|e| CacheError::ReadFailure {
      tier: "sqlite".to_string(),
      reason: e.to_string(),
    })?;
    Self::with_connection(conn, cache_name)
  }

  fn with_connection(conn: Connection, cache_name: &str) -> Result<Self, CacheError> {
    let tier = Self {
      conn: Mutex::new(conn),
      cache_name: cache_name.to_string(),
      label: format!("sqlite:{}", cache_name),
    };
    tier.run_migrations()?;
    tier.drop_old_versions()?;
    Ok(tier)
  }

  fn run_migrations(&self) -> Result<(), CacheError> {
    lock(&self.conn)
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| self.write_err(format!("failed to run cache migrations: {}", e)))
  }

  fn drop_old_versions(&self) -> Result<(), CacheError> {
    let removed = lock(&self.conn)
      .execute(
        "DELETE FROM snapshot_cache WHERE cache_name != ?",
        params![self.cache_name],
      )
      .map_err(|e| self.write_err(format!("failed to drop old cache versions: {}", e)))?;
    if removed > 0 {
      tracing::info!(removed, cache = %self.cache_name, "dropped entries from old cache versions");
    }
    Ok(())
  }

  fn write_err(&self, reason: String) -> CacheError {
    CacheError::WriteFailure {
      tier: self.label.clone(),
      reason,
    }
  }

  fn read_err(&self, reason: String) -> CacheError {
    CacheError::ReadFailure {
      tier: self.label.clone(),
      reason,
    }
  }

  fn row_to_entry(
    &self,
    key: String,
    payload: Vec<u8>,
    source: String,
    fetched_at: String,
    expires_at: String,
  ) -> Result<CacheEntry, CacheError> {
    let corrupt = |reason: String| CacheError::Corrupt {
      tier: self.label.clone(),
      key: key.clone(),
      reason,
    };

    let payload: Value = serde_json::from_slice(&payload).map_err(|e| corrupt(e.to_string()))?;
    let source = parse_source(&source).ok_or_else(|| corrupt(format!("unknown source '{}'", source)))?;
    let fetched_at = parse_datetime(&fetched_at).map_err(corrupt)?;
    let expires_at = parse_datetime(&expires_at).map_err(corrupt)?;

    Ok(CacheEntry {
      key: key.clone(),
      snapshot: DataSnapshot::new(payload, fetched_at, source),
      expires_at,
    })
  }
}

type Row = (String, Vec<u8>, String, String, String);

impl CacheTier for SqliteTier {
  fn name(&self) -> &str {
    &self.label
  }

  fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
    let row: Option<Row> = lock(&self.conn)
      .query_row(
        "SELECT key, payload, source, fetched_at, expires_at FROM snapshot_cache
         WHERE cache_name = ? AND key = ?",
        params![self.cache_name, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
      )
      .optional()
      .map_err(|e| self.read_err(format!("failed to query cache: {}", e)))?;

    row
      .map(|(key, payload, source, fetched, expires)| {
        self.row_to_entry(key, payload, source, fetched, expires)
      })
      .transpose()
  }

  fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
    let payload = serde_json::to_vec(&entry.snapshot.payload)
      .map_err(|e| self.write_err(format!("failed to serialize payload: {}", e)))?;

    lock(&self.conn)
      .execute(
        "INSERT OR REPLACE INTO snapshot_cache (cache_name, key, payload, source, fetched_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          self.cache_name,
          entry.key,
          payload,
          entry.snapshot.source.to_string(),
          entry.snapshot.fetched_at.to_rfc3339(),
          entry.expires_at.to_rfc3339(),
        ],
      )
      .map_err(|e| self.write_err(format!("failed to store snapshot: {}", e)))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<bool, CacheError> {
    let removed = lock(&self.conn)
      .execute(
        "DELETE FROM snapshot_cache WHERE cache_name = ? AND key = ?",
        params![self.cache_name, key],
      )
      .map_err(|e| self.write_err(format!("failed to remove entry: {}", e)))?;
    Ok(removed > 0)
  }

  fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
    let rows: Vec<Row> = {
      let conn = lock(&self.conn);
      let mut stmt = conn
        .prepare(
          "SELECT key, payload, source, fetched_at, expires_at FROM snapshot_cache
           WHERE cache_name = ? ORDER BY key",
        )
        .map_err(|e| self.read_err(format!("failed to prepare query: {}", e)))?;

      let rows = stmt
        .query_map(params![self.cache_name], |row| {
          Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })
        .map_err(|e| self.read_err(format!("failed to list entries: {}", e)))?
        .filter_map(|r| match r {
          Ok(row) => Some(row),
          Err(e) => {
            tracing::warn!(error = %e, "skipping unreadable cache row");
            None
          }
        })
        .collect();
      rows
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (key, payload, source, fetched, expires) in rows {
      match self.row_to_entry(key, payload, source, fetched, expires) {
        Ok(entry) => entries.push(entry),
        Err(e) => tracing::warn!(error = %e, "skipping corrupt cache row"),
      }
    }
    Ok(entries)
  }

  fn clear(&self) -> Result<usize, CacheError> {
    lock(&self.conn)
      .execute(
        "DELETE FROM snapshot_cache WHERE cache_name = ?",
        params![self.cache_name],
      )
      .map_err(|e| self.write_err(format!("failed to clear cache: {}", e)))
  }
}

fn parse_source(s: &str) -> Option<SourceKind> {
  match s {
    "remote" => Some(SourceKind::Remote),
    "cache" => Some(SourceKind::Cache),
    "static" => Some(SourceKind::Static),
    "default" => Some(SourceKind::Default),
    _ => None,
  }
}

/// Parse an RFC 3339 timestamp as stored by this tier.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| format!("failed to parse datetime '{}': {}", s, e))
}

// ============================================================================
// JSON-file key-value tier
// ============================================================================

/// Simple persistent key-value store: one JSON object of string values on
/// disk, with a total-size quota like browser local storage.
pub struct FileKvTier {
  path: PathBuf,
  quota: usize,
  guard: Mutex<()>,
}

impl FileKvTier {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      quota: DEFAULT_KV_QUOTA,
      guard: Mutex::new(()),
    }
  }

  pub fn with_quota(mut self, quota: usize) -> Self {
    self.quota = quota;
    self
  }

  fn read_map(&self) -> Result<BTreeMap<String, String>, CacheError> {
    match std::fs::read_to_string(&self.path) {
      Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
      Ok(contents) => serde_json::from_str(&contents).map_err(|e| CacheError::Corrupt {
        tier: "kv".to_string(),
        key: self.path.display().to_string(),
        reason: e.to_string(),
      }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
      Err(e) => Err(CacheError::ReadFailure {
        tier: "kv".to_string(),
        reason: format!("failed to read {}: {}", self.path.display(), e),
      }),
    }
  }

  /// Like `read_map`, but a corrupt file is discarded so the tier stays writable.
  fn read_map_for_write(&self) -> Result<BTreeMap<String, String>, CacheError> {
    match self.read_map() {
      Err(CacheError::Corrupt { reason, .. }) => {
        tracing::warn!(path = %self.path.display(), error = %reason, "discarding corrupt key-value file");
        Ok(BTreeMap::new())
      }
      other => other,
    }
  }

  fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), CacheError> {
    let write_err = |reason: String| CacheError::WriteFailure {
      tier: "kv".to_string(),
      reason,
    };

    let used: usize = map.iter().map(|(k, v)| k.len() + v.len()).sum();
    if used > self.quota {
      return Err(write_err(format!(
        "quota exceeded ({} of {} bytes)",
        used, self.quota
      )));
    }

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| write_err(format!("failed to create directory: {}", e)))?;
    }

    let contents =
      serde_json::to_string(map).map_err(|e| write_err(format!("failed to serialize: {}", e)))?;
    let tmp = self.path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|e| write_err(format!("failed to write: {}", e)))?;
    std::fs::rename(&tmp, &self.path).map_err(|e| write_err(format!("failed to replace: {}", e)))
  }

  fn decode(key: &str, raw: &str) -> Result<CacheEntry, CacheError> {
    serde_json::from_str(raw).map_err(|e| CacheError::Corrupt {
      tier: "kv".to_string(),
      key: key.to_string(),
      reason: e.to_string(),
    })
  }
}

impl CacheTier for FileKvTier {
  fn name(&self) -> &str {
    "kv"
  }

  fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
    let _guard = lock(&self.guard);
    let map = self.read_map()?;
    map
      .get(&format!("{}{}", KV_PREFIX, key))
      .map(|raw| Self::decode(key, raw))
      .transpose()
  }

  fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
    let _guard = lock(&self.guard);
    let mut map = self.read_map_for_write()?;
    let raw = serde_json::to_string(entry).map_err(|e| CacheError::WriteFailure {
      tier: "kv".to_string(),
      reason: e.to_string(),
    })?;
    map.insert(format!("{}{}", KV_PREFIX, entry.key), raw);
    self.write_map(&map)
  }

  fn remove(&self, key: &str) -> Result<bool, CacheError> {
    let _guard = lock(&self.guard);
    let mut map = self.read_map_for_write()?;
    let removed = map.remove(&format!("{}{}", KV_PREFIX, key)).is_some();
    if removed {
      self.write_map(&map)?;
    }
    Ok(removed)
  }

  fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
    let _guard = lock(&self.guard);
    let map = self.read_map()?;
    let mut entries = Vec::new();
    for (key, raw) in map.iter().filter(|(k, _)| k.starts_with(KV_PREFIX)) {
      match Self::decode(key, raw) {
        Ok(entry) => entries.push(entry),
        Err(e) => tracing::warn!(error = %e, "skipping corrupt key-value entry"),
      }
    }
    Ok(entries)
  }

  fn clear(&self) -> Result<usize, CacheError> {
    let _guard = lock(&self.guard);
    let mut map = match self.read_map() {
      Err(CacheError::Corrupt { reason, .. }) => {
        tracing::warn!(path = %self.path.display(), error = %reason, "removing corrupt key-value file");
        return match std::fs::remove_file(&self.path) {
          Ok(()) => Ok(1),
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
          Err(e) => Err(CacheError::WriteFailure {
            tier: "kv".to_string(),
            reason: format!("failed to remove {}: {}", self.path.display(), e),
          }),
        };
      }
      other => other?,
    };
    let before = map.len();
    map.retain(|k, _| !k.starts_with(KV_PREFIX));
    let removed = before - map.len();
    if removed > 0 {
      self.write_map(&map)?;
    }
    Ok(removed)
  }
}

// ============================================================================
// In-memory tier
// ============================================================================

/// Volatile tier. Holds entries for the lifetime of the process only; an
/// optional quota makes writes fail once the stored payload would exceed it.
#[derive(Default)]
pub struct MemoryTier {
  name: String,
  entries: Mutex<HashMap<String, CacheEntry>>,
  quota: Option<usize>,
}

impl MemoryTier {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entries: Mutex::new(HashMap::new()),
      quota: None,
    }
  }

  pub fn with_quota(mut self, quota: usize) -> Self {
    self.quota = Some(quota);
    self
  }
}

impl CacheTier for MemoryTier {
  fn name(&self) -> &str {
    &self.name
  }

  fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
    Ok(lock(&self.entries).get(key).cloned())
  }

  fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
    let mut entries = lock(&self.entries);
    if let Some(quota) = self.quota {
      let used: usize = entries
        .iter()
        .filter(|(k, _)| k.as_str() != entry.key)
        .map(|(_, e)| e.payload_bytes())
        .sum();
      if used + entry.payload_bytes() > quota {
        return Err(CacheError::WriteFailure {
          tier: self.name.clone(),
          reason: format!("quota exceeded ({} bytes)", quota),
        });
      }
    }
    entries.insert(entry.key.clone(), entry.clone());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<bool, CacheError> {
    Ok(lock(&self.entries).remove(key).is_some())
  }

  fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
    Ok(lock(&self.entries).values().cloned().collect())
  }

  fn clear(&self) -> Result<usize, CacheError> {
    let mut entries = lock(&self.entries);
    let removed = entries.len();
    entries.clear();
    Ok(removed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn entry(key: &str, payload: Value, minutes_ago: i64) -> CacheEntry {
    let snapshot = DataSnapshot::new(
      payload,
      Utc::now() - Duration::minutes(minutes_ago),
      SourceKind::Remote,
    );
    CacheEntry::new(key, snapshot, Duration::minutes(5))
  }

  fn exercise(tier: &dyn CacheTier) {
    assert_eq!(tier.get("projects").unwrap(), None);

    let e = entry("projects", serde_json::json!([{ "id": 1 }]), 2);
    tier.put(&e).unwrap();
    let got = tier.get("projects").unwrap().unwrap();
    assert_eq!(got.snapshot.payload, e.snapshot.payload);
    assert_eq!(got.snapshot.source, SourceKind::Remote);
    assert_eq!(got.fetched_at().timestamp(), e.fetched_at().timestamp());

    tier.put(&entry("profile", serde_json::json!({ "name": "A" }), 1)).unwrap();
    assert_eq!(tier.entries().unwrap().len(), 2);

    assert!(tier.remove("profile").unwrap());
    assert!(!tier.remove("profile").unwrap());
    assert_eq!(tier.clear().unwrap(), 1);
    assert!(tier.entries().unwrap().is_empty());
  }

  #[test]
  fn test_sqlite_tier() {
    let dir = tempfile::tempdir().unwrap();
    let tier = SqliteTier::open(&dir.path().join("cache.db"), DEFAULT_CACHE_NAME).unwrap();
    exercise(&tier);
  }

  #[test]
  fn test_sqlite_drops_old_versions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    {
      let old = SqliteTier::open(&path, "portfolio-data-v0").unwrap();
      old.put(&entry("home", serde_json::json!({ "name": "X" }), 0)).unwrap();
    }
    let current = SqliteTier::open(&path, DEFAULT_CACHE_NAME).unwrap();
    assert_eq!(current.get("home").unwrap(), None);

    let reopened_old = SqliteTier::open(&path, "portfolio-data-v0").unwrap();
    assert_eq!(reopened_old.get("home").unwrap(), None);
  }

  #[test]
  fn test_file_kv_tier() {
    let dir = tempfile::tempdir().unwrap();
    let tier = FileKvTier::new(dir.path().join("local-storage.json"));
    exercise(&tier);
  }

  #[test]
  fn test_file_kv_quota() {
    let dir = tempfile::tempdir().unwrap();
    let tier = FileKvTier::new(dir.path().join("ls.json")).with_quota(64);
    let big = entry("projects", serde_json::json!(["x".repeat(200)]), 0);
    assert!(matches!(tier.put(&big), Err(CacheError::WriteFailure { .. })));
    assert_eq!(tier.get("projects").unwrap(), None);
  }

  #[test]
  fn test_file_kv_keeps_foreign_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ls.json");
    std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

    let tier = FileKvTier::new(&path);
    tier.put(&entry("home", serde_json::json!({ "name": "X" }), 0)).unwrap();
    assert_eq!(tier.clear().unwrap(), 1);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("theme"));
  }

  #[test]
  fn test_file_kv_recovers_from_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ls.json");
    std::fs::write(&path, "{ not json").unwrap();

    let tier = FileKvTier::new(&path);
    assert!(matches!(tier.get("home"), Err(CacheError::Corrupt { .. })));

    assert_eq!(tier.clear().unwrap(), 1);
    assert!(!path.exists());

    std::fs::write(&path, "{ not json").unwrap();
    tier.put(&entry("home", serde_json::json!({ "name": "X" }), 0)).unwrap();
    assert!(tier.get("home").unwrap().is_some());
  }

  #[test]
  fn test_memory_tier() {
    exercise(&MemoryTier::new("memory"));
  }

  #[test]
  fn test_memory_quota() {
    let tier = MemoryTier::new("small").with_quota(10);
    assert!(tier.put(&entry("a", serde_json::json!("abc"), 0)).is_ok());
    assert!(tier.put(&entry("b", serde_json::json!("abcdefgh"), 0)).is_err());
    // replacing an existing key does not double count it
    assert!(tier.put(&entry("a", serde_json::json!("abcd"), 0)).is_ok());
  }
}
