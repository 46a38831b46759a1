//! Per-category source state machine.
//!
//! Resolution order is Remote > Cached > Static > Default. Concurrent
//! resolves of one category share a single in-flight remote attempt, and data
//! already shown is never replaced by something worse.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::PersistentCache;
use crate::error::{RemoteError, SourceError};
use crate::model::{Category, CategoryData, DataSnapshot, SourceKind, SourceState};
use crate::remote::{Connectivity, QueryParams, RemoteClient};
use crate::snapshots::StaticStore;

use super::provider::{
  resolve_in_order, CacheProvider, DefaultProvider, RemoteProvider, SourceProvider, StaticProvider,
};
use super::recovery::Recoverable;

/// Injected capabilities shared by every category's arbitrator.
#[derive(Clone)]
pub struct Sources {
  pub remote: RemoteClient,
  pub cache: Arc<PersistentCache>,
  pub statics: Arc<dyn StaticStore>,
  pub connectivity: Arc<dyn Connectivity>,
}

/// Tunables for arbitration and recovery.
#[derive(Debug, Clone, Copy)]
pub struct ArbitratorOptions {
  /// Cached snapshots older than this are served but flagged for refresh.
  pub stale_window: Duration,
  /// Wait after an offline to online transition before probing.
  pub settle_delay: std::time::Duration,
  /// Probe cadence while the category sits on a fallback.
  pub retry_interval: std::time::Duration,
}

impl Default for ArbitratorOptions {
  fn default() -> Self {
    Self {
      stale_window: Duration::minutes(5),
      settle_delay: std::time::Duration::from_secs(1),
      retry_interval: std::time::Duration::from_secs(60),
    }
  }
}

/// Whether a held `Remote` snapshot may be returned without a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
  UseHeld,
  Revalidate,
}

/// What consumers of one category observe.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryView<T> {
  pub data: Option<T>,
  pub fetched_at: Option<DateTime<Utc>>,
  /// True only until the first snapshot of any kind is produced.
  pub loading: bool,
  pub error: Option<String>,
  pub source: SourceState,
  /// A recovery probe is in flight.
  pub recovering: bool,
}

impl<T> Default for CategoryView<T> {
  fn default() -> Self {
    Self {
      data: None,
      fetched_at: None,
      loading: true,
      error: None,
      source: SourceState::Unresolved,
      recovering: false,
    }
  }
}

struct Inner<T> {
  state: SourceState,
  held: Option<DataSnapshot<T>>,
  error: Option<String>,
}

type RemoteAttempt<T> = Shared<BoxFuture<'static, Result<DataSnapshot<T>, RemoteError>>>;

struct InFlight<T> {
  generation: u64,
  attempt: RemoteAttempt<T>,
}

pub struct SourceArbitrator<T: CategoryData> {
  remote: Arc<RemoteProvider<T>>,
  cache: CacheProvider<T>,
  statics: StaticProvider<T>,
  default: DefaultProvider<T>,
  connectivity: Arc<dyn Connectivity>,
  options: ArbitratorOptions,
  inner: Mutex<Inner<T>>,
  in_flight: Mutex<Option<InFlight<T>>>,
  generation: AtomicU64,
  recovering: AtomicBool,
  view: watch::Sender<CategoryView<T>>,
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Whether a fallback snapshot should replace the one on display.
///
/// A held `Remote` payload is never replaced by a fallback. Otherwise a higher
/// ranked source wins, and an equally ranked one wins when it is not older.
fn fallback_replaces<T>(held: Option<&DataSnapshot<T>>, candidate: &DataSnapshot<T>) -> bool {
  let Some(held) = held else {
    return true;
  };
  if held.source == SourceKind::Remote {
    return false;
  }
  // Source precedence outranks timestamp order: an older cached copy still replaces static.
  let (held_rank, new_rank) = (held.source.rank(), candidate.source.rank());
  new_rank > held_rank || (new_rank == held_rank && candidate.fetched_at >= held.fetched_at)
}

impl<T: CategoryData> SourceArbitrator<T> {
  pub fn new(sources: Sources, params: QueryParams, options: ArbitratorOptions) -> Self {
    let (view, _rx) = watch::channel(CategoryView::default());
    Self {
      remote: Arc::new(RemoteProvider::new(
        sources.remote,
        params.clone(),
        sources.cache.clone(),
      )),
      cache: CacheProvider::new(sources.cache, &params),
      statics: StaticProvider::new(sources.statics),
      default: DefaultProvider::default(),
      connectivity: sources.connectivity,
      options,
      inner: Mutex::new(Inner {
        state: SourceState::Unresolved,
        held: None,
        error: None,
      }),
      in_flight: Mutex::new(None),
      generation: AtomicU64::new(0),
      recovering: AtomicBool::new(false),
      view,
    }
  }

  pub fn category(&self) -> Category {
    T::CATEGORY
  }

  pub fn options(&self) -> &ArbitratorOptions {
    &self.options
  }

  pub fn state(&self) -> SourceState {
    lock(&self.inner).state
  }

  pub fn held(&self) -> Option<DataSnapshot<T>> {
    lock(&self.inner).held.clone()
  }

  /// Whether the held payload came from a live, cached or static source.
  fn holds_real_data(&self) -> bool {
    lock(&self.inner)
      .held
      .as_ref()
      .is_some_and(|held| held.source != SourceKind::Default)
  }

  pub fn error(&self) -> Option<String> {
    lock(&self.inner).error.clone()
  }

  pub fn view(&self) -> CategoryView<T> {
    self.view.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<CategoryView<T>> {
    self.view.subscribe()
  }

  /// Held `Remote` data when available, otherwise run the full algorithm.
  pub async fn resolve(&self) -> DataSnapshot<T> {
    self.resolve_with(ResolveMode::UseHeld).await
  }

  /// Always attempt the remote first.
  pub async fn revalidate(&self) -> DataSnapshot<T> {
    self.resolve_with(ResolveMode::Revalidate).await
  }

  /// Forget the current state so the next resolve runs from scratch. The held
  /// payload stays on display until something replaces it.
  pub fn reset(&self) {
    let mut inner = lock(&self.inner);
    if inner.state != SourceState::Unresolved {
      debug!(category = %T::CATEGORY, from = %inner.state, "arbitrator reset");
    }
    inner.state = SourceState::Unresolved;
    inner.error = None;
    self.publish(&inner);
  }

  pub async fn resolve_with(&self, mode: ResolveMode) -> DataSnapshot<T> {
    if mode == ResolveMode::UseHeld {
      let inner = lock(&self.inner);
      if inner.state.is_remote() {
        if let Some(held) = &inner.held {
          return held.clone();
        }
      }
    }

    let remote = if self.connectivity.is_online() {
      self.remote_attempt().await
    } else {
      debug!(category = %T::CATEGORY, "offline, skipping remote");
      Err(RemoteError::Network("device is offline".to_string()))
    };

    match remote {
      Ok(snapshot) => self.accept_remote(snapshot),
      Err(RemoteError::GraphQl(message)) if self.holds_real_data() => {
        // Server-side failure with good data on screen: report, keep the source.
        warn!(category = %T::CATEGORY, error = %message, "remote query failed, keeping held data");
        let mut inner = lock(&self.inner);
        inner.error = Some(RemoteError::GraphQl(message).to_string());
        self.publish(&inner);
        match &inner.held {
          Some(held) => held.clone(),
          None => DataSnapshot::now(T::default_record(), SourceKind::Default),
        }
      }
      Err(e) => {
        if e.is_transport() {
          debug!(category = %T::CATEGORY, error = %e, "remote unavailable, falling back");
        } else {
          warn!(category = %T::CATEGORY, error = %e, "remote query failed, falling back");
        }
        self.fall_back(e).await
      }
    }
  }

  /// Join the in-flight remote attempt for this category or start one.
  async fn remote_attempt(&self) -> Result<DataSnapshot<T>, RemoteError> {
    let (generation, attempt) = {
      let mut slot = lock(&self.in_flight);
      let joined = slot
        .as_ref()
        .map(|in_flight| (in_flight.generation, in_flight.attempt.clone()));
      match joined {
        Some(joined) => {
          debug!(category = %T::CATEGORY, "joining in-flight remote request");
          joined
        }
        None => {
          let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
          let remote = self.remote.clone();
          let attempt = async move { remote.fetch().await }.boxed().shared();
          *slot = Some(InFlight {
            generation,
            attempt: attempt.clone(),
          });
          (generation, attempt)
        }
      }
    };

    let result = attempt.await;

    let mut slot = lock(&self.in_flight);
    if slot.as_ref().map(|f| f.generation) == Some(generation) {
      *slot = None;
    }
    result
  }

  fn accept_remote(&self, snapshot: DataSnapshot<T>) -> DataSnapshot<T> {
    let mut inner = lock(&self.inner);
    let newer_held = inner
      .held
      .as_ref()
      .filter(|h| h.source == SourceKind::Remote && h.fetched_at > snapshot.fetched_at)
      .is_some();
    if !newer_held {
      inner.held = Some(snapshot);
    }
    self.transition(&mut inner, SourceState::Remote);
    inner.error = None;
    self.publish(&inner);
    match &inner.held {
      Some(held) => held.clone(),
      None => DataSnapshot::now(T::default_record(), SourceKind::Default),
    }
  }

  async fn fall_back(&self, remote_error: RemoteError) -> DataSnapshot<T> {
    let chain: [&dyn SourceProvider<T>; 3] = [&self.cache, &self.statics, &self.default];
    let resolved = match resolve_in_order(&chain).await {
      Ok(resolved) => resolved,
      Err(errors) => {
        // The embedded default cannot fail; keep the arbitrator total anyway.
        warn!(category = %T::CATEGORY, failures = errors.len(), "every source failed");
        super::provider::Resolved {
          snapshot: DataSnapshot::now(T::default_record(), SourceKind::Default),
          skipped: errors,
        }
      }
    };

    let snapshot = resolved.snapshot;
    if snapshot.source == SourceKind::Cache && snapshot.is_stale(self.options.stale_window, Utc::now()) {
      debug!(
        category = %T::CATEGORY,
        age_secs = snapshot.age(Utc::now()).num_seconds(),
        "serving stale cached snapshot"
      );
    }
    for (kind, error) in &resolved.skipped {
      if !matches!(error, SourceError::CacheMiss(_)) {
        warn!(category = %T::CATEGORY, source = %kind, error = %error, "fallback source failed");
      }
    }

    let mut inner = lock(&self.inner);
    if fallback_replaces(inner.held.as_ref(), &snapshot) {
      inner.held = Some(snapshot.clone());
    }
    self.transition(&mut inner, snapshot.source.into());
    inner.error = match snapshot.source {
      SourceKind::Default => Some(format!(
        "no {} data could be loaded ({}); showing built-in defaults",
        T::CATEGORY,
        remote_error
      )),
      _ => None,
    };
    self.publish(&inner);

    match &inner.held {
      Some(held) => held.clone(),
      None => snapshot,
    }
  }

  fn transition(&self, inner: &mut Inner<T>, next: SourceState) {
    if inner.state != next {
      info!(category = %T::CATEGORY, from = %inner.state, to = %next, "source changed");
      inner.state = next;
    }
  }

  fn publish(&self, inner: &Inner<T>) {
    self.view.send_replace(CategoryView {
      data: inner.held.as_ref().map(|h| h.payload.clone()),
      fetched_at: inner.held.as_ref().map(|h| h.fetched_at),
      loading: inner.held.is_none(),
      error: inner.error.clone(),
      source: inner.state,
      recovering: self.recovering.load(Ordering::SeqCst),
    });
  }

  fn set_recovering(&self, recovering: bool) {
    self.recovering.store(recovering, Ordering::SeqCst);
    let inner = lock(&self.inner);
    self.publish(&inner);
  }
}

#[async_trait]
impl<T: CategoryData> Recoverable for SourceArbitrator<T> {
  fn category(&self) -> Category {
    T::CATEGORY
  }

  fn needs_recovery(&self) -> bool {
    self.state().is_fallback()
  }

  async fn recover(&self) -> bool {
    self.set_recovering(true);
    self.revalidate().await;
    self.set_recovering(false);
    let recovered = self.state().is_remote();
    if recovered {
      info!(category = %T::CATEGORY, "recovered remote source");
    } else {
      debug!(category = %T::CATEGORY, state = %self.state(), "recovery probe failed");
    }
    recovered
  }
}
