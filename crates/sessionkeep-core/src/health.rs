//! Periodic liveness probing for session backends.
//!
//! The monitor only flips availability flags; it never cancels requests
//! already in flight against a backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::ManagedBackend;

pub struct HealthMonitor {
    backends: Vec<Arc<ManagedBackend>>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(backends: Vec<Arc<ManagedBackend>>, interval: Duration) -> Self {
        Self { backends, interval }
    }

    /// Probe every backend once. Returns how many are up.
    pub async fn probe_all(&self) -> usize {
        let results =
            futures_util::future::join_all(self.backends.iter().map(|b| b.probe())).await;
        results.into_iter().filter(|up| *up).count()
    }

    /// Run the probe loop until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let up = self.probe_all().await;
                        tracing::debug!(up, total = self.backends.len(), "backend health probe");
                    }
                }
            }
        })
    }
}
