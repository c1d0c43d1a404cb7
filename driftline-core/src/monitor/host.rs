use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

/// Signal sent to the host when newly scanned files should be handed out.
/// The host answers by calling
/// [`FileSystemMonitor::partition_files_and_get`](super::FileSystemMonitor::partition_files_and_get).
pub trait TaskReconfigurationRequester: Send + Sync {
    /// Fire-and-forget; must not block.
    fn request_task_reconfiguration(&self);
}

/// Requester backed by a [`Notify`] for hosts that await the signal.
#[derive(Debug, Default)]
pub struct NotifyReconfigurationRequester {
    notify: Notify,
    requests: AtomicU64,
}

impl NotifyReconfigurationRequester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes on the next request, or immediately if one arrived while
    /// nobody was waiting.
    pub async fn requested(&self) {
        self.notify.notified().await;
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl TaskReconfigurationRequester for NotifyReconfigurationRequester {
    fn request_task_reconfiguration(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stored_request_wakes_later_waiter() {
        let requester = NotifyReconfigurationRequester::new();
        requester.request_task_reconfiguration();

        tokio::time::timeout(Duration::from_secs(1), requester.requested())
            .await
            .unwrap();
        assert_eq!(requester.request_count(), 1);
    }
}
