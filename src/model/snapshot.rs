//! Category, source and snapshot types shared by every layer.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Independently resolved data domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Projects,
  Profile,
  #[serde(rename = "home")]
  HomeStats,
}

impl Category {
  pub const ALL: [Category; 3] = [Category::Projects, Category::Profile, Category::HomeStats];

  /// Storage key shared with the service worker's cache entries.
  pub fn key(&self) -> &'static str {
    match self {
      Self::Projects => "projects",
      Self::Profile => "profile",
      Self::HomeStats => "home",
    }
  }

  /// File name of the published static snapshot under `data/`.
  pub fn static_file(&self) -> &'static str {
    match self {
      Self::Projects => "projects.json",
      Self::Profile => "profile.json",
      Self::HomeStats => "homedata.json",
    }
  }

  /// Top-level field of the GraphQL `data` object for this category.
  pub fn graphql_field(&self) -> &'static str {
    match self {
      Self::Projects => "projects",
      Self::Profile => "profile",
      Self::HomeStats => "homeData",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.key())
  }
}

impl FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "projects" | "project" => Ok(Self::Projects),
      "profile" | "about" => Ok(Self::Profile),
      "home" | "homedata" | "stats" => Ok(Self::HomeStats),
      other => Err(format!("unknown category '{}'", other)),
    }
  }
}

/// Where a snapshot's payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
  Remote,
  Cache,
  Static,
  Default,
}

impl SourceKind {
  /// Precedence: Remote > Cache > Static > Default.
  pub fn rank(&self) -> u8 {
    match self {
      Self::Remote => 3,
      Self::Cache => 2,
      Self::Static => 1,
      Self::Default => 0,
    }
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Remote => "remote",
      Self::Cache => "cache",
      Self::Static => "static",
      Self::Default => "default",
    };
    f.write_str(s)
  }
}

/// Per-category arbitration state. Only the arbitrator moves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
  #[default]
  Unresolved,
  Remote,
  Cached,
  Static,
  Default,
}

impl From<SourceKind> for SourceState {
  fn from(kind: SourceKind) -> Self {
    match kind {
      SourceKind::Remote => Self::Remote,
      SourceKind::Cache => Self::Cached,
      SourceKind::Static => Self::Static,
      SourceKind::Default => Self::Default,
    }
  }
}

impl SourceState {
  pub fn is_remote(&self) -> bool {
    matches!(self, Self::Remote)
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, Self::Cached | Self::Static | Self::Default)
  }
}

impl fmt::Display for SourceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Unresolved => "unknown",
      Self::Remote => "remote",
      Self::Cached => "cache",
      Self::Static => "static",
      Self::Default => "default",
    };
    f.pad(s)
  }
}

/// Immutable payload plus fetch time and source tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot<T> {
  pub payload: T,
  pub fetched_at: DateTime<Utc>,
  #[serde(rename = "sourceKind")]
  pub source: SourceKind,
}

impl<T> DataSnapshot<T> {
  pub fn new(payload: T, fetched_at: DateTime<Utc>, source: SourceKind) -> Self {
    Self {
      payload,
      fetched_at,
      source,
    }
  }

  /// Snapshot stamped with the current time.
  pub fn now(payload: T, source: SourceKind) -> Self {
    Self::new(payload, Utc::now(), source)
  }

  pub fn age(&self, now: DateTime<Utc>) -> Duration {
    now - self.fetched_at
  }

  /// Older than the stale window. Stale snapshots remain valid fallbacks.
  pub fn is_stale(&self, stale_window: Duration, now: DateTime<Utc>) -> bool {
    self.age(now) > stale_window
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DataSnapshot<U> {
    DataSnapshot {
      payload: f(self.payload),
      fetched_at: self.fetched_at,
      source: self.source,
    }
  }

  pub fn with_source(mut self, source: SourceKind) -> Self {
    self.source = source;
    self
  }
}

impl<T: Serialize> DataSnapshot<T> {
  /// SHA256 of the serialized payload, hex encoded. Used to tell whether a
  /// refreshed payload actually differs from what consumers already have.
  pub fn digest(&self) -> String {
    let bytes = serde_json::to_vec(&self.payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
  }
}

/// Record type resolved for one category.
///
/// Implementors name their category and supply the embedded record used when
/// every other source is exhausted.
pub trait CategoryData: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  const CATEGORY: Category;

  /// Last-resort record compiled into the binary.
  fn default_record() -> Self;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_category_keys_and_files() {
    assert_eq!(Category::HomeStats.key(), "home");
    assert_eq!(Category::HomeStats.static_file(), "homedata.json");
    assert_eq!(Category::HomeStats.graphql_field(), "homeData");
    assert_eq!("about".parse::<Category>(), Ok(Category::Profile));
    assert!("blog".parse::<Category>().is_err());
  }

  #[test]
  fn test_precedence_order() {
    assert!(SourceKind::Remote.rank() > SourceKind::Cache.rank());
    assert!(SourceKind::Cache.rank() > SourceKind::Static.rank());
    assert!(SourceKind::Static.rank() > SourceKind::Default.rank());
  }

  #[test]
  fn test_staleness() {
    let now = Utc::now();
    let snap = DataSnapshot::new(1, now - Duration::minutes(3), SourceKind::Cache);
    assert!(!snap.is_stale(Duration::minutes(5), now));
    assert!(snap.is_stale(Duration::minutes(2), now));
  }

  #[test]
  fn test_digest_tracks_payload_only() {
    let a = DataSnapshot::now(vec!["x"], SourceKind::Remote);
    let b = DataSnapshot::now(vec!["x"], SourceKind::Cache);
    let c = DataSnapshot::now(vec!["y"], SourceKind::Remote);
    assert_eq!(a.digest(), b.digest());
    assert_ne!(a.digest(), c.digest());
  }

  #[test]
  fn test_snapshot_wire_names() {
    let snap = DataSnapshot::now(5, SourceKind::Static);
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["sourceKind"], "static");
    assert!(json.get("fetchedAt").is_some());
  }
}
