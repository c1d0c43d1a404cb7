use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use driftline_model::{FileObject, PartitionKey, StateSnapshot};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{StateBackingStore, StateUpdateListener};
use crate::error::StoreError;

struct LogEntry {
    offset: u64,
    key: PartitionKey,
    value: Option<FileObject>,
}

#[derive(Default)]
struct AppliedState {
    offset: u64,
    states: HashMap<PartitionKey, FileObject>,
}

struct StoreShared {
    started: AtomicBool,
    replication_delay: Duration,
    /// Offset of the last entry appended to the log.
    written: Mutex<u64>,
    /// Offset of the last entry applied and delivered to the listener.
    applied: watch::Sender<u64>,
    state: RwLock<AppliedState>,
    listener: RwLock<Option<Arc<dyn StateUpdateListener>>>,
    log_tx: mpsc::UnboundedSender<LogEntry>,
    log_rx: Mutex<Option<mpsc::UnboundedReceiver<LogEntry>>>,
    shutdown: CancellationToken,
}

impl StoreShared {
    fn append(&self, key: PartitionKey, value: Option<FileObject>) {
        // Offset assignment and send happen under one lock so the log is
        // delivered in offset order.
        let mut written = self.written.lock();
        let offset = *written + 1;
        if self.log_tx.send(LogEntry { offset, key, value }).is_err() {
            warn!(offset, "state log is closed; dropping write");
            return;
        }
        *written = offset;
    }

    fn written(&self) -> u64 {
        *self.written.lock()
    }

    fn apply(&self, entry: LogEntry, notify: bool) {
        {
            let mut state = self.state.write();
            match &entry.value {
                Some(object) => {
                    state.states.insert(entry.key.clone(), object.clone());
                }
                None => {
                    state.states.remove(&entry.key);
                }
            }
            state.offset = entry.offset;
        }

        let listener = if notify {
            self.listener.read().clone()
        } else {
            None
        };
        if let Some(listener) = listener {
            match &entry.value {
                Some(object) => listener.on_state_update(&entry.key, object),
                None => listener.on_state_remove(&entry.key),
            }
        }

        // Published last: a refresh that observes this offset has also seen
        // every notification up to it.
        self.applied.send_replace(entry.offset);
    }
}

/// In-process [`StateBackingStore`] backed by an ordered log.
///
/// Writes are appended to an unbounded log and applied by a replication task
/// spawned in [`StateBackingStore::start`], so readers observe them
/// eventually, exactly like a replicated changelog. Entries written before
/// `start` are restored silently. `replication_delay` makes the lag observable
/// in tests.
#[derive(Clone)]
pub struct InMemoryStateStore {
    shared: Arc<StoreShared>,
}

impl fmt::Debug for InMemoryStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStateStore")
            .field("started", &self.shared.started.load(Ordering::SeqCst))
            .field("written", &self.shared.written())
            .field("applied", &*self.shared.applied.borrow())
            .field("replication_delay", &self.shared.replication_delay)
            .field("has_listener", &self.shared.listener.read().is_some())
            .finish()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::with_replication_delay(Duration::ZERO)
    }

    pub fn with_replication_delay(replication_delay: Duration) -> Self {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        let (applied, _) = watch::channel(0);
        Self {
            shared: Arc::new(StoreShared {
                started: AtomicBool::new(false),
                replication_delay,
                written: Mutex::new(0),
                applied,
                state: RwLock::new(AppliedState::default()),
                listener: RwLock::new(None),
                log_tx,
                log_rx: Mutex::new(Some(log_rx)),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Appends a tombstone for `key`.
    pub fn delete_async(&self, key: PartitionKey) {
        self.shared.append(key, None);
    }

    /// Offset of the last write accepted by the log.
    pub fn end_offset(&self) -> u64 {
        self.shared.written()
    }

    /// Stops the replication task; pending writes are left unapplied.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    async fn replicate(
        shared: Arc<StoreShared>,
        mut log_rx: mpsc::UnboundedReceiver<LogEntry>,
    ) {
        loop {
            let entry = tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                entry = log_rx.recv() => entry,
            };
            let Some(entry) = entry else { break };
            if !shared.replication_delay.is_zero() {
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(shared.replication_delay) => {}
                }
            }
            debug!(offset = entry.offset, partition_key = %entry.key, "applying state log entry");
            shared.apply(entry, true);
        }
        info!("state log replication stopped");
    }
}

#[async_trait]
impl StateBackingStore for InMemoryStateStore {
    async fn start(&self) -> Result<(), StoreError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(StoreError::Closed);
        }
        let Some(mut log_rx) = self.shared.log_rx.lock().take() else {
            return Ok(());
        };
        // The backlog written before start is the initial state; listeners
        // are only told about later writes.
        let mut restored = 0usize;
        while let Ok(entry) = log_rx.try_recv() {
            self.shared.apply(entry, false);
            restored += 1;
        }
        if restored > 0 {
            debug!(restored, "restored state log backlog");
        }
        self.shared.started.store(true, Ordering::SeqCst);
        tokio::spawn(Self::replicate(Arc::clone(&self.shared), log_rx));
        info!("started in-memory state store");
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    async fn refresh(&self, timeout: Duration) -> Result<(), StoreError> {
        if !self.is_started() {
            return Err(StoreError::NotStarted);
        }
        if self.shared.shutdown.is_cancelled() {
            return Err(StoreError::Closed);
        }
        let target = self.shared.written();
        let mut applied = self.shared.applied.subscribe();
        match tokio::time::timeout(timeout, applied.wait_for(|offset| *offset >= target)).await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(StoreError::Closed),
            Err(_) => Err(StoreError::Timeout(timeout)),
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let state = self.shared.state.read();
        StateSnapshot::new(state.offset, state.states.clone())
    }

    fn put_async(&self, key: PartitionKey, object: FileObject) {
        self.shared.append(key, Some(object));
    }

    fn set_update_listener(&self, listener: Arc<dyn StateUpdateListener>) {
        *self.shared.listener.write() = Some(listener);
    }
}
