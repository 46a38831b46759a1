//! Persistent cache façade: redundant, monotonic writes across tiers.

use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::model::{Category, DataSnapshot};
use crate::remote::QueryParams;

use super::storage::{FileKvTier, SqliteTier};
use super::traits::{CacheEntry, CacheTier, TierInfo, WriteReport};

/// Where and how the persistent tiers are stored.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  pub enabled: bool,
  /// SQLite database backing the structured tier.
  pub path: PathBuf,
  /// JSON file backing the key-value tier.
  pub kv_path: PathBuf,
  pub name: String,
  pub stale_window: Duration,
}

/// Cache key for a category resolved with `params`.
pub fn cache_key(category: Category, params: &QueryParams) -> String {
  match params.key_suffix() {
    Some(suffix) => format!("{}?{}", category.key(), suffix),
    None => category.key().to_string(),
  }
}

/// Last-known-good snapshot store shared by all categories.
///
/// Every write goes to every tier so losing one (quota, unavailable storage)
/// keeps the other's copy. Writes never replace a newer `fetched_at`.
pub struct PersistentCache {
  tiers: Vec<Arc<dyn CacheTier>>,
  /// Stale window used to stamp `expires_at` on new entries.
  stale_window: Duration,
  /// Serializes compare-then-write so out-of-order completions cannot
  /// interleave between the read and the write.
  write_lock: Mutex<()>,
}

impl PersistentCache {
  pub fn new(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
    Self {
      tiers,
      stale_window: Duration::minutes(5),
      write_lock: Mutex::new(()),
    }
  }

  /// Open the structured and key-value tiers described by `options`.
  ///
  /// A tier that cannot be opened is left out; the cache keeps working with
  /// whatever remains.
  pub fn open(options: &CacheOptions) -> Self {
    if !options.enabled {
      info!("persistent cache disabled");
      return Self::disabled();
    }

    let mut tiers: Vec<Arc<dyn CacheTier>> = Vec::new();

    match SqliteTier::open(&options.path, &options.name) {
      Ok(tier) => tiers.push(Arc::new(tier)),
      Err(e) => warn!(path = %options.path.display(), error = %e, "structured cache tier unavailable"),
    }
    tiers.push(Arc::new(FileKvTier::new(options.kv_path.clone())));

    Self::new(tiers).with_stale_window(options.stale_window)
  }

  /// Cache with no tiers: every read misses and every write is discarded.
  pub fn disabled() -> Self {
    Self::new(Vec::new())
  }

  pub fn with_stale_window(mut self, stale_window: Duration) -> Self {
    self.stale_window = stale_window;
    self
  }

  pub fn stale_window(&self) -> Duration {
    self.stale_window
  }

  pub fn tier_names(&self) -> Vec<String> {
    self.tiers.iter().map(|t| t.name().to_string()).collect()
  }

  /// Newest snapshot held by any tier. Tier errors are logged and skipped.
  pub async fn get(&self, key: &str) -> Option<DataSnapshot<Value>> {
    let mut best: Option<CacheEntry> = None;

    for tier in &self.tiers {
      match tier.get(key) {
        Ok(Some(entry)) => {
          if best
            .as_ref()
            .map_or(true, |b| entry.fetched_at() > b.fetched_at())
          {
            best = Some(entry);
          }
        }
        Ok(None) => {}
        Err(e) => warn!(tier = tier.name(), key, error = %e, "cache read failed, skipping tier"),
      }
    }

    best.map(|entry| entry.snapshot)
  }

  /// Write `snapshot` to every tier unless that tier already holds a newer one.
  pub async fn put(&self, key: &str, snapshot: &DataSnapshot<Value>) -> WriteReport {
    let entry = CacheEntry::new(key, snapshot.clone(), self.stale_window);
    let mut report = WriteReport::default();
    let _guard = self
      .write_lock
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    for tier in &self.tiers {
      let name = tier.name().to_string();

      let existing = match tier.get(key) {
        Ok(existing) => existing,
        Err(e) => {
          debug!(tier = %name, key, error = %e, "unreadable entry, overwriting");
          None
        }
      };

      if let Some(existing) = existing {
        if existing.fetched_at() > entry.fetched_at() {
          debug!(tier = %name, key, "newer snapshot already cached, skipping write");
          report.superseded.push(name);
          continue;
        }
      }

      match tier.put(&entry) {
        Ok(()) => report.written.push(name),
        Err(e) => {
          warn!(tier = %name, key, error = %e, "cache write failed");
          report.failures.push(e);
        }
      }
    }

    report
  }

  /// Remove every entry from every tier. Returns entries removed.
  pub async fn clear_all(&self) -> usize {
    let _guard = self
      .write_lock
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    self
      .tiers
      .iter()
      .map(|tier| match tier.clear() {
        Ok(n) => n,
        Err(e) => {
          warn!(tier = tier.name(), error = %e, "cache clear failed");
          0
        }
      })
      .sum()
  }

  /// Drop local copies fetched more than `stale_window` ago.
  ///
  /// Returns the number of distinct keys removed from at least one tier.
  pub async fn prune_expired(&self, stale_window: Duration) -> usize {
    let cutoff = Utc::now() - stale_window;
    let mut removed: HashSet<String> = HashSet::new();
    let _guard = self
      .write_lock
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());

    for tier in &self.tiers {
      let entries = match tier.entries() {
        Ok(entries) => entries,
        Err(e) => {
          warn!(tier = tier.name(), error = %e, "cache prune could not list entries");
          continue;
        }
      };

      for entry in entries.into_iter().filter(|e| e.fetched_at() < cutoff) {
        match tier.remove(&entry.key) {
          Ok(true) => {
            debug!(tier = tier.name(), key = %entry.key, "removed expired cache entry");
            removed.insert(entry.key);
          }
          Ok(false) => {}
          Err(e) => warn!(tier = tier.name(), key = %entry.key, error = %e, "cache prune failed"),
        }
      }
    }

    removed.len()
  }

  /// Entry count and payload size per tier.
  pub async fn info(&self) -> Vec<TierInfo> {
    self
      .tiers
      .iter()
      .map(|tier| {
        let entries = tier.entries().unwrap_or_default();
        TierInfo {
          name: tier.name().to_string(),
          entries: entries.len(),
          bytes: entries.iter().map(CacheEntry::payload_bytes).sum(),
        }
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryTier;
  use crate::model::{ProjectType, SourceKind};

  fn tiers() -> (Arc<MemoryTier>, Arc<MemoryTier>) {
    (
      Arc::new(MemoryTier::new("structured")),
      Arc::new(MemoryTier::new("kv")),
    )
  }

  fn snap(payload: Value, minutes_ago: i64) -> DataSnapshot<Value> {
    DataSnapshot::new(
      payload,
      Utc::now() - Duration::minutes(minutes_ago),
      SourceKind::Remote,
    )
  }

  #[test]
  fn test_cache_key() {
    assert_eq!(cache_key(Category::Profile, &QueryParams::default()), "profile");
    assert_eq!(
      cache_key(Category::Projects, &QueryParams::of_type(ProjectType::Personal)),
      "projects?type=personal"
    );
  }

  #[tokio::test]
  async fn test_write_through_both_tiers() {
    let (a, b) = tiers();
    let cache = PersistentCache::new(vec![a.clone(), b.clone()]);

    let report = cache.put("home", &snap(serde_json::json!({ "name": "X" }), 0)).await;
    assert_eq!(report.written, vec!["structured", "kv"]);
    assert!(a.get("home").unwrap().is_some());
    assert!(b.get("home").unwrap().is_some());
  }

  #[tokio::test]
  async fn test_out_of_order_writes_keep_newest() {
    let (a, b) = tiers();
    let cache = PersistentCache::new(vec![a, b]);

    let older = snap(serde_json::json!("t1"), 4);
    let newer = snap(serde_json::json!("t2"), 1);

    cache.put("projects", &newer).await;
    let report = cache.put("projects", &older).await;
    assert_eq!(report.superseded.len(), 2);
    assert!(report.written.is_empty());

    let held = cache.get("projects").await.unwrap();
    assert_eq!(held.fetched_at, newer.fetched_at);
    assert_eq!(held.payload, serde_json::json!("t2"));
  }

  #[tokio::test]
  async fn test_one_tier_failing_keeps_other_copy() {
    let full = Arc::new(MemoryTier::new("structured").with_quota(4));
    let kv = Arc::new(MemoryTier::new("kv"));
    let cache = PersistentCache::new(vec![full, kv]);

    let report = cache
      .put("profile", &snap(serde_json::json!({ "name": "Long enough" }), 0))
      .await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.written, vec!["kv"]);
    assert!(report.is_persisted());

    let held = cache.get("profile").await.unwrap();
    assert_eq!(held.payload["name"], "Long enough");
  }

  #[tokio::test]
  async fn test_get_prefers_newest_tier() {
    let (a, b) = tiers();
    a.put(&CacheEntry::new("home", snap(serde_json::json!("old"), 10), Duration::minutes(5)))
      .unwrap();
    b.put(&CacheEntry::new("home", snap(serde_json::json!("new"), 1), Duration::minutes(5)))
      .unwrap();

    let cache = PersistentCache::new(vec![a, b]);
    assert_eq!(cache.get("home").await.unwrap().payload, serde_json::json!("new"));
  }

  #[tokio::test]
  async fn test_prune_expired() {
    let (a, b) = tiers();
    let cache = PersistentCache::new(vec![a.clone(), b.clone()]);

    cache.put("projects", &snap(serde_json::json!([]), 30)).await;
    cache.put("profile", &snap(serde_json::json!({}), 1)).await;

    assert_eq!(cache.prune_expired(Duration::minutes(5)).await, 1);
    assert!(cache.get("projects").await.is_none());
    assert!(cache.get("profile").await.is_some());
  }

  #[tokio::test]
  async fn test_clear_and_info() {
    let (a, b) = tiers();
    let cache = PersistentCache::new(vec![a, b]);
    cache.put("home", &snap(serde_json::json!("abc"), 0)).await;

    let info = cache.info().await;
    assert_eq!(info.len(), 2);
    assert!(info.iter().all(|t| t.entries == 1 && t.bytes == 5));

    assert_eq!(cache.clear_all().await, 2);
    assert!(cache.get("home").await.is_none());
  }

  #[tokio::test]
  async fn test_open_creates_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let options = CacheOptions {
      enabled: true,
      path: dir.path().join("nested").join("cache.db"),
      kv_path: dir.path().join("nested").join("local-storage.json"),
      name: "portfolio-data-v1".to_string(),
      stale_window: Duration::minutes(5),
    };

    let cache = PersistentCache::open(&options);
    assert_eq!(cache.tier_names().len(), 2);
    let report = cache.put("home", &snap(serde_json::json!({ "name": "X" }), 0)).await;
    assert_eq!(report.written.len(), 2);

    let reopened = PersistentCache::open(&options);
    assert_eq!(reopened.get("home").await.unwrap().payload["name"], "X");
  }

  #[tokio::test]
  async fn test_disabled_cache() {
    let cache = PersistentCache::disabled();
    let report = cache.put("home", &snap(serde_json::json!(1), 0)).await;
    assert!(!report.is_persisted());
    assert!(cache.get("home").await.is_none());
  }
}
