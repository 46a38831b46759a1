//! Periodic background prune of stale cache entries.

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use super::layer::PersistentCache;

/// Runs `prune_expired` every `interval`, off the request path.
/// The first sweep happens one interval after spawning. Aborted on drop.
pub struct PruneSweeper {
  handle: JoinHandle<()>,
}

impl PruneSweeper {
  pub fn spawn(cache: Arc<PersistentCache>, stale_window: Duration, interval: std::time::Duration) -> Self {
    let handle = tokio::spawn(async move {
      let start = tokio::time::Instant::now() + interval;
      let mut ticker = tokio::time::interval_at(start, interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let removed = cache.prune_expired(stale_window).await;
        if removed > 0 {
          info!(removed, "pruned expired cache entries");
        }
      }
    });

    Self { handle }
  }

  pub fn stop(self) {
    self.handle.abort();
  }
}

impl Drop for PruneSweeper {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheTier, MemoryTier};
  use crate::model::{DataSnapshot, SourceKind};
  use chrono::Utc;

  #[tokio::test(start_paused = true)]
  async fn test_sweeps_on_interval_not_immediately() {
    let tier = Arc::new(MemoryTier::new("memory"));
    let cache = Arc::new(PersistentCache::new(vec![tier.clone()]));
    let old = DataSnapshot::new(
      serde_json::json!([]),
      Utc::now() - Duration::minutes(30),
      SourceKind::Remote,
    );
    cache.put("projects", &old).await;

    let _sweeper = PruneSweeper::spawn(
      cache.clone(),
      Duration::minutes(5),
      std::time::Duration::from_secs(3600),
    );

    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
    assert!(tier.get("projects").unwrap().is_some());

    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    assert!(tier.get("projects").unwrap().is_none());
  }
}
