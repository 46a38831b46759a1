//! Data sources for one category, and the shared precedence chain.

use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::PersistentCache;
use crate::error::{RemoteError, SourceError};
use crate::model::{CategoryData, DataSnapshot, SourceKind};
use crate::remote::{QueryParams, RemoteClient};
use crate::snapshots::StaticStore;

/// One place a category's data can come from.
#[async_trait]
pub trait SourceProvider<T: CategoryData>: Send + Sync {
  fn kind(&self) -> SourceKind;

  async fn provide(&self) -> Result<DataSnapshot<T>, SourceError>;
}

/// Outcome of walking a provider chain.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
  pub snapshot: DataSnapshot<T>,
  /// Failures of the providers tried before the one that answered.
  pub skipped: Vec<(SourceKind, SourceError)>,
}

/// Ask each provider in turn and return the first snapshot produced.
///
/// Providers after the first success are never called. Fails only when every
/// provider failed, returning all of their errors in order.
pub async fn resolve_in_order<T: CategoryData>(
  providers: &[&dyn SourceProvider<T>],
) -> Result<Resolved<T>, Vec<(SourceKind, SourceError)>> {
  let mut skipped = Vec::new();

  for provider in providers {
    match provider.provide().await {
      Ok(snapshot) => {
        debug!(
          category = %T::CATEGORY,
          source = %provider.kind(),
          skipped = skipped.len(),
          "source answered"
        );
        return Ok(Resolved { snapshot, skipped });
      }
      Err(e) => {
        debug!(category = %T::CATEGORY, source = %provider.kind(), error = %e, "source failed");
        skipped.push((provider.kind(), e));
      }
    }
  }

  Err(skipped)
}

fn decode<T: CategoryData>(payload: Value) -> Result<T, SourceError> {
  serde_json::from_value(payload).map_err(|e| SourceError::Decode {
    category: T::CATEGORY,
    reason: e.to_string(),
  })
}

/// Remote Query Client plus write-through to the persistent cache.
pub struct RemoteProvider<T> {
  client: RemoteClient,
  params: QueryParams,
  cache: Arc<PersistentCache>,
  key: String,
  _marker: PhantomData<fn() -> T>,
}

impl<T: CategoryData> RemoteProvider<T> {
  pub fn new(client: RemoteClient, params: QueryParams, cache: Arc<PersistentCache>) -> Self {
    let key = crate::cache::cache_key(T::CATEGORY, &params);
    Self {
      client,
      params,
      cache,
      key,
      _marker: PhantomData,
    }
  }

  /// Fetch, stamp with the current time and persist. A cache write failure
  /// never fails the fetch.
  pub async fn fetch(&self) -> Result<DataSnapshot<T>, RemoteError> {
    let payload: T = self.client.fetch(T::CATEGORY, &self.params).await?;
    let snapshot = DataSnapshot::now(payload, SourceKind::Remote);

    match serde_json::to_value(&snapshot.payload) {
      Ok(value) => {
        let stored = DataSnapshot::new(value, snapshot.fetched_at, SourceKind::Remote);
        let report = self.cache.put(&self.key, &stored).await;
        if !report.failures.is_empty() && !report.is_persisted() {
          warn!(key = %self.key, "snapshot not persisted to any cache tier");
        }
      }
      Err(e) => warn!(key = %self.key, error = %e, "cannot serialize snapshot for cache"),
    }

    Ok(snapshot)
  }
}

#[async_trait]
impl<T: CategoryData> SourceProvider<T> for RemoteProvider<T> {
  fn kind(&self) -> SourceKind {
    SourceKind::Remote
  }

  async fn provide(&self) -> Result<DataSnapshot<T>, SourceError> {
    Ok(self.fetch().await?)
  }
}

/// Last snapshot persisted by any session, however old.
pub struct CacheProvider<T> {
  cache: Arc<PersistentCache>,
  key: String,
  _marker: PhantomData<fn() -> T>,
}

impl<T: CategoryData> CacheProvider<T> {
  pub fn new(cache: Arc<PersistentCache>, params: &QueryParams) -> Self {
    Self {
      key: crate::cache::cache_key(T::CATEGORY, params),
      cache,
      _marker: PhantomData,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }
}

#[async_trait]
impl<T: CategoryData> SourceProvider<T> for CacheProvider<T> {
  fn kind(&self) -> SourceKind {
    SourceKind::Cache
  }

  async fn provide(&self) -> Result<DataSnapshot<T>, SourceError> {
    let stored = self
      .cache
      .get(&self.key)
      .await
      .ok_or(SourceError::CacheMiss(T::CATEGORY))?;

    let fetched_at = stored.fetched_at;
    let payload = decode::<T>(stored.payload)?;
    Ok(DataSnapshot::new(payload, fetched_at, SourceKind::Cache))
  }
}

/// Published build-time snapshot.
pub struct StaticProvider<T> {
  store: Arc<dyn StaticStore>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: CategoryData> StaticProvider<T> {
  pub fn new(store: Arc<dyn StaticStore>) -> Self {
    Self {
      store,
      _marker: PhantomData,
    }
  }
}

#[async_trait]
impl<T: CategoryData> SourceProvider<T> for StaticProvider<T> {
  fn kind(&self) -> SourceKind {
    SourceKind::Static
  }

  async fn provide(&self) -> Result<DataSnapshot<T>, SourceError> {
    let raw = self.store.read(T::CATEGORY).await?;
    Ok(DataSnapshot::now(decode::<T>(raw)?, SourceKind::Static))
  }
}

/// Embedded record; never fails.
pub struct DefaultProvider<T>(PhantomData<fn() -> T>);

impl<T> Default for DefaultProvider<T> {
  fn default() -> Self {
    Self(PhantomData)
  }
}

#[async_trait]
impl<T: CategoryData> SourceProvider<T> for DefaultProvider<T> {
  fn kind(&self) -> SourceKind {
    SourceKind::Default
  }

  async fn provide(&self) -> Result<DataSnapshot<T>, SourceError> {
    Ok(DataSnapshot::now(T::default_record(), SourceKind::Default))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryTier;
  use crate::error::StaticError;
  use crate::model::{Category, HomeData, Profile};
  use crate::remote::GraphTransport;
  use crate::remote::GraphQuery;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Counting {
    kind: SourceKind,
    result: Result<Profile, SourceError>,
    calls: AtomicUsize,
  }

  impl Counting {
    fn ok(kind: SourceKind, name: &str) -> Self {
      let mut profile = Profile::default_record();
      profile.name = name.to_string();
      Self {
        kind,
        result: Ok(profile),
        calls: AtomicUsize::new(0),
      }
    }

    fn failing(kind: SourceKind, error: SourceError) -> Self {
      Self {
        kind,
        result: Err(error),
        calls: AtomicUsize::new(0),
      }
    }
  }

  #[async_trait]
  impl SourceProvider<Profile> for Counting {
    fn kind(&self) -> SourceKind {
      self.kind
    }

    async fn provide(&self) -> Result<DataSnapshot<Profile>, SourceError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self
        .result
        .clone()
        .map(|p| DataSnapshot::now(p, self.kind))
    }
  }

  struct Answer(Result<Value, RemoteError>);

  #[async_trait]
  impl GraphTransport for Answer {
    async fn execute(&self, _query: &GraphQuery) -> Result<Value, RemoteError> {
      self.0.clone()
    }
  }

  #[tokio::test]
  async fn test_first_success_wins_and_later_sources_untouched() {
    let remote = Counting::failing(SourceKind::Remote, RemoteError::Timeout(5000).into());
    let cache = Counting::ok(SourceKind::Cache, "cached");
    let fixed = Counting::ok(SourceKind::Static, "static");

    let resolved = resolve_in_order::<Profile>(&[&remote, &cache, &fixed])
      .await
      .unwrap();

    assert_eq!(resolved.snapshot.source, SourceKind::Cache);
    assert_eq!(resolved.snapshot.payload.name, "cached");
    assert_eq!(resolved.skipped.len(), 1);
    assert_eq!(fixed.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_all_failing_reports_every_error() {
    let cache = Counting::failing(SourceKind::Cache, SourceError::CacheMiss(Category::Profile));
    let fixed = Counting::failing(
      SourceKind::Static,
      StaticError::NotFound(Category::Profile).into(),
    );

    let errors = resolve_in_order::<Profile>(&[&cache, &fixed]).await.unwrap_err();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[1].0, SourceKind::Static);
  }

  #[tokio::test]
  async fn test_default_always_answers() {
    let cache = Counting::failing(SourceKind::Cache, SourceError::CacheMiss(Category::Profile));
    let default = DefaultProvider::<Profile>::default();

    let resolved = resolve_in_order::<Profile>(&[&cache, &default]).await.unwrap();
    assert_eq!(resolved.snapshot.source, SourceKind::Default);
    assert_eq!(resolved.snapshot.payload, Profile::default_record());
  }

  #[tokio::test]
  async fn test_remote_writes_through_to_cache() {
    let cache = Arc::new(PersistentCache::new(vec![Arc::new(MemoryTier::new("memory"))]));
    let body = serde_json::json!({
      "name": "X",
      "roles": ["Engineer"],
      "intro": ["hi"],
      "stats": { "yearsExperience": 3, "technologiesCount": 4, "projectsDelivered": 5 }
    });
    let client = RemoteClient::new(Arc::new(Answer(Ok(body))));
    let remote = RemoteProvider::<HomeData>::new(client, QueryParams::default(), cache.clone());

    let snapshot = remote.fetch().await.unwrap();
    assert_eq!(snapshot.payload.name, "X");

    let reader = CacheProvider::<HomeData>::new(cache, &QueryParams::default());
    let cached = reader.provide().await.unwrap();
    assert_eq!(cached.source, SourceKind::Cache);
    assert_eq!(cached.fetched_at, snapshot.fetched_at);
    assert_eq!(cached.payload, snapshot.payload);
  }

  #[tokio::test]
  async fn test_cache_decode_failure() {
    let cache = Arc::new(PersistentCache::new(vec![Arc::new(MemoryTier::new("memory"))]));
    cache
      .put("profile", &DataSnapshot::now(serde_json::json!([1, 2]), SourceKind::Remote))
      .await;

    let reader = CacheProvider::<Profile>::new(cache, &QueryParams::default());
    assert!(matches!(
      reader.provide().await,
      Err(SourceError::Decode { category: Category::Profile, .. })
    ));
  }
}
