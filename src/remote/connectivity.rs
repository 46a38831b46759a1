//! Online/offline signal consumed by the arbitrator and recovery task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::client::HttpTransport;

/// Connectivity capability. The host (or a probe) reports transitions; the
/// data layer only reads and subscribes.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;

  /// Receiver that observes every online/offline transition.
  fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Connectivity state backed by a watch channel.
#[derive(Clone)]
pub struct ConnectivitySignal {
  tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  /// Report the current state. Subscribers only wake on actual changes.
  pub fn set_online(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      if online {
        info!("connectivity restored");
      } else {
        info!("connectivity lost");
      }
    }
  }
}

impl Default for ConnectivitySignal {
  fn default() -> Self {
    Self::new(true)
  }
}

impl Connectivity for ConnectivitySignal {
  fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Background task that periodically checks the endpoint is reachable and
/// feeds the result into a `ConnectivitySignal`. Aborted on drop.
pub struct ReachabilityProbe {
  handle: JoinHandle<()>,
}

impl ReachabilityProbe {
  pub fn spawn(transport: HttpTransport, signal: ConnectivitySignal, interval: Duration) -> Self {
    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let reachable = probe(&transport).await;
        debug!(reachable, "reachability probe");
        signal.set_online(reachable);
      }
    });

    Self { handle }
  }
}

impl Drop for ReachabilityProbe {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// Any HTTP answer counts as reachable; only transport failures do not.
async fn probe(transport: &HttpTransport) -> bool {
  transport
    .http()
    .get(transport.endpoint().clone())
    .send()
    .await
    .is_ok()
}
