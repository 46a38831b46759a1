//! Scheduled recovery: re-probe the remote after reconnects and on a fixed
//! interval while a category sits on a fallback source.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::model::Category;
use crate::remote::Connectivity;

/// Something that can retry its remote source.
#[async_trait]
pub trait Recoverable: Send + Sync {
  fn category(&self) -> Category;

  /// Currently serving a fallback.
  fn needs_recovery(&self) -> bool;

  /// Run one remote attempt. Returns true when the remote source is back.
  async fn recover(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
  Reconnected,
  Interval,
}

/// Background task driving `Recoverable::recover`.
///
/// One attempt per offline to online transition, after `settle_delay`, plus
/// one per `retry_interval` tick while online. The interval restarts after
/// every attempt, so probes never run back to back. Holds only a weak
/// reference to its target and is aborted on drop.
pub struct RecoveryTask {
  handle: JoinHandle<()>,
}

impl RecoveryTask {
  pub fn spawn(
    target: Weak<dyn Recoverable>,
    connectivity: Arc<dyn Connectivity>,
    settle_delay: Duration,
    retry_interval: Duration,
  ) -> Self {
    // Subscribe before spawning so a transition racing the first poll is seen.
    let mut online_rx = connectivity.subscribe();
    let mut was_online = *online_rx.borrow_and_update();
    let first_retry = Instant::now() + retry_interval;

    let handle = tokio::spawn(async move {
      let mut retry = tokio::time::interval_at(first_retry, retry_interval);
      retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        let trigger = tokio::select! {
          changed = online_rx.changed() => {
            if changed.is_err() {
              break;
            }
            let online = *online_rx.borrow_and_update();
            let reconnected = online && !was_online;
            was_online = online;
            if !reconnected {
              continue;
            }
            Trigger::Reconnected
          }
          _ = retry.tick() => Trigger::Interval,
        };

        if trigger == Trigger::Reconnected {
          tokio::time::sleep(settle_delay).await;
          was_online = *online_rx.borrow_and_update();
        }
        if !connectivity.is_online() {
          continue;
        }

        let Some(target) = target.upgrade() else {
          break;
        };
        if !target.needs_recovery() {
          continue;
        }

        debug!(category = %target.category(), ?trigger, "recovery probe");
        target.recover().await;
        retry.reset();
      }
    });

    Self { handle }
  }

  pub fn stop(self) {
    self.handle.abort();
  }
}

impl Drop for RecoveryTask {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
