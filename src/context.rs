//! Reactive Data Context.
//!
//! Owns one arbitrator per category together with the background work that
//! keeps them fresh (recovery probes and the cache sweep). Consumers read or
//! subscribe to per-category views; dropping the context stops every task.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::info;

use crate::cache::{PersistentCache, PruneSweeper};
use crate::model::{Category, HomeData, Profile, Project, ProjectType, SourceState};
use crate::remote::{Connectivity, QueryParams};
use crate::source::{
  ArbitratorOptions, CategoryView, Recoverable, RecoveryTask, SourceArbitrator, Sources,
};

/// Aggregate indicator across all categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
  /// Every category is served from the remote.
  Live,
  /// At least one category is on cached or static data.
  Fallback,
  /// The connectivity signal reports offline.
  Offline,
  /// At least one category fell all the way to built-in defaults.
  Degraded,
}

impl DataStatus {
  pub fn from_states(states: &[SourceState], online: bool) -> Self {
    if states.contains(&SourceState::Default) {
      Self::Degraded
    } else if !online {
      Self::Offline
    } else if states.iter().all(SourceState::is_remote) {
      Self::Live
    } else {
      Self::Fallback
    }
  }
}

impl fmt::Display for DataStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Live => "live",
      Self::Fallback => "fallback",
      Self::Offline => "offline",
      Self::Degraded => "degraded",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
  pub arbitrator: ArbitratorOptions,
  /// Background prune cadence; `None` disables the sweep.
  pub prune_interval: Option<std::time::Duration>,
  /// Type filter applied to the Projects category.
  pub project_type: Option<ProjectType>,
}

pub struct DataContext {
  projects: Arc<SourceArbitrator<Vec<Project>>>,
  profile: Arc<SourceArbitrator<Profile>>,
  home: Arc<SourceArbitrator<HomeData>>,
  cache: Arc<PersistentCache>,
  connectivity: Arc<dyn Connectivity>,
  _recovery: Vec<RecoveryTask>,
  _sweeper: Option<PruneSweeper>,
}

impl DataContext {
  /// Build the arbitrators and spawn their background tasks. Must be called
  /// inside a tokio runtime. Nothing is fetched until `start`.
  pub fn new(sources: Sources, options: ContextOptions) -> Self {
    let arb = options.arbitrator;
    let project_params = QueryParams {
      project_type: options.project_type,
    };

    let projects = Arc::new(SourceArbitrator::new(sources.clone(), project_params, arb));
    let profile = Arc::new(SourceArbitrator::new(sources.clone(), QueryParams::default(), arb));
    let home = Arc::new(SourceArbitrator::new(sources.clone(), QueryParams::default(), arb));

    let targets: [Weak<dyn Recoverable>; 3] = [
      Arc::downgrade(&projects) as Weak<dyn Recoverable>,
      Arc::downgrade(&profile) as Weak<dyn Recoverable>,
      Arc::downgrade(&home) as Weak<dyn Recoverable>,
    ];
    let recovery = targets
      .into_iter()
      .map(|target| {
        RecoveryTask::spawn(
          target,
          sources.connectivity.clone(),
          arb.settle_delay,
          arb.retry_interval,
        )
      })
      .collect();

    let sweeper = options
      .prune_interval
      .map(|interval| PruneSweeper::spawn(sources.cache.clone(), sources.cache.stale_window(), interval));

    Self {
      projects,
      profile,
      home,
      cache: sources.cache,
      connectivity: sources.connectivity,
      _recovery: recovery,
      _sweeper: sweeper,
    }
  }

  /// Resolve every category concurrently.
  pub async fn start(&self) {
    tokio::join!(self.projects.resolve(), self.profile.resolve(), self.home.resolve());
  }

  pub fn projects(&self) -> CategoryView<Vec<Project>> {
    self.projects.view()
  }

  pub fn profile(&self) -> CategoryView<Profile> {
    self.profile.view()
  }

  pub fn home(&self) -> CategoryView<HomeData> {
    self.home.view()
  }

  pub fn subscribe_projects(&self) -> watch::Receiver<CategoryView<Vec<Project>>> {
    self.projects.subscribe()
  }

  pub fn subscribe_profile(&self) -> watch::Receiver<CategoryView<Profile>> {
    self.profile.subscribe()
  }

  pub fn subscribe_home(&self) -> watch::Receiver<CategoryView<HomeData>> {
    self.home.subscribe()
  }

  pub fn source(&self, category: Category) -> SourceState {
    match category {
      Category::Projects => self.projects.state(),
      Category::Profile => self.profile.state(),
      Category::HomeStats => self.home.state(),
    }
  }

  pub fn status(&self) -> DataStatus {
    let states: Vec<SourceState> = Category::ALL.iter().map(|c| self.source(*c)).collect();
    DataStatus::from_states(&states, self.connectivity.is_online())
  }

  /// Go to the remote for `category` regardless of what is held.
  pub async fn refetch(&self, category: Category) {
    match category {
      Category::Projects => {
        self.projects.revalidate().await;
      }
      Category::Profile => {
        self.profile.revalidate().await;
      }
      Category::HomeStats => {
        self.home.revalidate().await;
      }
    }
  }

  /// Reset every category to unresolved and run the full resolution again.
  pub async fn refresh_connection(&self) {
    info!("refreshing connection");
    self.projects.reset();
    self.profile.reset();
    self.home.reset();
    self.start().await;
  }

  /// Empty every cache tier, then re-resolve. Returns entries removed.
  pub async fn clear_cache(&self) -> usize {
    let removed = self.cache.clear_all().await;
    info!(removed, "cache cleared");
    self.refresh_connection().await;
    removed
  }

  pub fn cache(&self) -> &Arc<PersistentCache> {
    &self.cache
  }
}
