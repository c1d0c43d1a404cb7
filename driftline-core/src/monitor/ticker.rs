use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{FileSystemMonitor, TaskReconfigurationRequester};

/// Drives [`FileSystemMonitor::on_tick`] on a fixed period until shut down.
pub struct MonitorTicker {
    monitor: FileSystemMonitor,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for MonitorTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTicker")
            .field("monitor", &self.monitor)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl MonitorTicker {
    pub fn spawn(
        monitor: FileSystemMonitor,
        host: Arc<dyn TaskReconfigurationRequester>,
        period: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            async move {
                info!(period_ms = period.as_millis() as u64, "monitor ticker started");
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => monitor.on_tick(host.as_ref()).await,
                    }
                }
                info!("monitor ticker stopped");
            }
        });
        Self {
            monitor,
            cancel,
            handle,
        }
    }

    pub fn monitor(&self) -> &FileSystemMonitor {
        &self.monitor
    }

    /// Stops ticking, waits for an in-flight tick and closes the monitor.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "monitor ticker task failed");
        }
        self.monitor.close().await;
    }
}
