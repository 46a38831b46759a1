//! Core types for the persistent snapshot cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::model::DataSnapshot;

/// A persisted snapshot. The payload stays untyped JSON so every tier can
/// store every category; decoding happens in the source provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
  pub key: String,
  pub snapshot: DataSnapshot<Value>,
  /// `fetched_at + stale window` at write time.
  pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(key: impl Into<String>, snapshot: DataSnapshot<Value>, stale_window: Duration) -> Self {
    let expires_at = snapshot.fetched_at + stale_window;
    Self {
      key: key.into(),
      snapshot,
      expires_at,
    }
  }

  pub fn fetched_at(&self) -> DateTime<Utc> {
    self.snapshot.fetched_at
  }

  /// Serialized payload size, used for quota accounting and cache info.
  pub fn payload_bytes(&self) -> usize {
    serde_json::to_vec(&self.snapshot.payload)
      .map(|b| b.len())
      .unwrap_or(0)
  }
}

/// One storage tier (structured store, key-value store, ...).
///
/// Tiers are plain storage: ordering and redundancy rules live in
/// `PersistentCache`, which is the only writer.
pub trait CacheTier: Send + Sync {
  /// Short name used in logs and cache info.
  fn name(&self) -> &str;

  fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

  /// Insert or replace the entry for `entry.key`.
  fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;

  /// Returns whether an entry was removed.
  fn remove(&self, key: &str) -> Result<bool, CacheError>;

  fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;

  /// Remove everything. Returns the number of entries removed.
  fn clear(&self) -> Result<usize, CacheError>;
}

/// Outcome of a redundant write across all tiers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteReport {
  /// Tiers that now hold the new snapshot.
  pub written: Vec<String>,
  /// Tiers that already held a newer snapshot and were left untouched.
  pub superseded: Vec<String>,
  /// Tiers that failed (quota, storage unavailable). Never fatal.
  pub failures: Vec<CacheError>,
}

impl WriteReport {
  /// At least one tier holds this snapshot or a newer one.
  pub fn is_persisted(&self) -> bool {
    !self.written.is_empty() || !self.superseded.is_empty()
  }
}

/// Size summary for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierInfo {
  pub name: String,
  pub entries: usize,
  pub bytes: usize,
}

/// Render a byte count the way the cache info view shows it.
pub fn format_bytes(bytes: usize) -> String {
  if bytes == 0 {
    return "0 Bytes".to_string();
  }
  const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  let rounded = (value * 100.0).round() / 100.0;
  format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::SourceKind;

  #[test]
  fn test_expiry_is_fetch_time_plus_window() {
    let snap = DataSnapshot::now(serde_json::json!([1, 2]), SourceKind::Remote);
    let fetched = snap.fetched_at;
    let entry = CacheEntry::new("projects", snap, Duration::minutes(5));
    assert_eq!(entry.expires_at, fetched + Duration::minutes(5));
    assert_eq!(entry.payload_bytes(), 5);
  }

  #[test]
  fn test_format_bytes() {
    assert_eq!(format_bytes(0), "0 Bytes");
    assert_eq!(format_bytes(512), "512 Bytes");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
  }

  #[test]
  fn test_report_persisted() {
    let mut report = WriteReport::default();
    assert!(!report.is_persisted());
    report.superseded.push("sqlite".into());
    assert!(report.is_persisted());
  }
}
