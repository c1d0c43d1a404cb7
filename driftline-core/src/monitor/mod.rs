//! The monitor engine.
//!
//! [`FileSystemMonitor`] keeps three in-memory views of the work it manages:
//!
//! - *scheduled*: files handed to workers and not yet cleaned,
//! - *scanned*: files found by the last admitted scan, awaiting hand-off,
//! - *completed*: records that reached a completed status, awaiting cleanup.
//!
//! Three independent call sites mutate them: the periodic [`on_tick`], the
//! host-driven [`partition_files_and_get`] and the state store's update
//! listener. Scanning and scheduling share one critical section; the listener
//! only touches the concurrent containers and flags a change that forces any
//! in-flight scheduling attempt to start over.
//!
//! [`on_tick`]: FileSystemMonitor::on_tick
//! [`partition_files_and_get`]: FileSystemMonitor::partition_files_and_get

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use driftline_model::{FileObject, FileObjectMeta, FileObjectStatus, PartitionKey, StateSnapshot};
use futures::FutureExt;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cleanup::{BatchFileCleanupPolicy, CleanupOutcome};
use crate::config::MonitorConfig;
use crate::error::{Result, StoreError};
use crate::key_policy::{AttributeKeyPolicy, PartitionKeyPolicy};
use crate::listing::{FileSystem, FileSystemListing};
use crate::store::{StateBackingStore, StateUpdateListener};

mod completed;
mod host;
mod scan;
mod schedule;
mod ticker;


pub use host::{NotifyReconfigurationRequester, TaskReconfigurationRequester};
pub use scan::{KeyConflict, ScanRejection};
pub use schedule::{
    MAX_SCHEDULE_ATTEMPTS, SchedulingPhase, group_partitions, partition_by_last_modified,
};
pub use ticker::MonitorTicker;

use completed::CompletedQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorPhase {
    /// Constructed; the host has not pulled a batch yet.
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
}

impl MonitorPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => MonitorPhase::NotStarted,
            1 => MonitorPhase::Running,
            _ => MonitorPhase::Stopped,
        }
    }
}

/// Containers shared with the state store listener.
#[derive(Debug, Default)]
struct WorkSets {
    scheduled: DashMap<PartitionKey, FileObjectMeta>,
    scanned: DashMap<PartitionKey, FileObjectMeta>,
    completed: CompletedQueue,
    /// Set when a notification removed a scanned file.
    changed: AtomicBool,
}

impl StateUpdateListener for WorkSets {
    fn on_state_update(&self, key: &PartitionKey, object: &FileObject) {
        if object.status.is_completed() {
            debug!(partition_key = %key, status = %object.status, "received completed status");
            self.completed.push(object.clone().with_key(key.clone()));
            if self.scanned.remove(key).is_some() {
                self.changed.store(true, Ordering::SeqCst);
            }
        } else if object.status.is_cleaned() && self.scheduled.remove(key).is_none() {
            warn!(
                partition_key = %key,
                "received cleaned status for a file that is not scheduled; expected only while recovering"
            );
        }
    }

    fn on_state_remove(&self, _key: &PartitionKey) {}
}

/// Deadline bookkeeping owned by the scan/schedule critical section.
#[derive(Debug, Default)]
struct ScanGate {
    next_allowed_reconfiguration: Option<Instant>,
}

struct MonitorInner {
    config: MonitorConfig,
    listing: Arc<dyn FileSystemListing>,
    cleaner: Arc<dyn BatchFileCleanupPolicy>,
    key_policy: Arc<dyn PartitionKeyPolicy>,
    store: Arc<dyn StateBackingStore>,
    sets: Arc<WorkSets>,
    snapshot: parking_lot::RwLock<Arc<StateSnapshot>>,
    gate: Mutex<ScanGate>,
    scan_published: Notify,
    phase: AtomicU8,
    reconfiguration_requested: AtomicBool,
}

/// Scans a listing, reconciles it with the state store and hands out batches
/// of files to the host's workers. Cheap to clone.
#[derive(Clone)]
pub struct FileSystemMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for FileSystemMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemMonitor")
            .field("phase", &self.phase())
            .field("listing", &self.inner.listing.name())
            .field("scheduled", &self.scheduled_count())
            .field("scanned", &self.scanned_count())
            .field("completed", &self.completed_count())
            .field("log_position", &self.inner.snapshot.read().offset())
            .finish()
    }
}

impl FileSystemMonitor {
    /// Registers the update listener, starts the store when needed, reads it
    /// to the end and recovers completed records left by a previous run.
    pub async fn new(
        config: MonitorConfig,
        listing: Arc<dyn FileSystemListing>,
        cleaner: Arc<dyn BatchFileCleanupPolicy>,
        key_policy: Arc<dyn PartitionKeyPolicy>,
        store: Arc<dyn StateBackingStore>,
    ) -> Result<Self> {
        config.validate()?;
        info!(listing = listing.name(), "initializing file system monitor");

        let sets = Arc::new(WorkSets::default());
        store.set_update_listener(Arc::clone(&sets) as Arc<dyn StateUpdateListener>);
        if store.is_started() {
            warn!(
                "state store is already started; expected when recovering from a crash or resuming"
            );
        } else {
            store.start().await?;
        }

        let startup_timeout = config.startup_read_to_end_timeout();
        let monitor = Self {
            inner: Arc::new(MonitorInner {
                config,
                listing,
                cleaner,
                key_policy,
                store,
                sets,
                snapshot: parking_lot::RwLock::new(Arc::new(StateSnapshot::empty())),
                gate: Mutex::new(ScanGate::default()),
                scan_published: Notify::new(),
                phase: AtomicU8::new(MonitorPhase::NotStarted as u8),
                reconfiguration_requested: AtomicBool::new(false),
            }),
        };

        monitor.sync_to_end(startup_timeout).await;
        monitor.recover_completed();
        info!("initialized file system monitor");
        Ok(monitor)
    }

    /// Builds the listing, cleanup and key policies described by `config`.
    pub async fn from_config(
        config: MonitorConfig,
        fs: Arc<dyn FileSystem>,
        store: Arc<dyn StateBackingStore>,
    ) -> Result<Self> {
        let listing = Arc::new(config.listing.build(Arc::clone(&fs))?);
        let cleaner = config.cleanup.build(fs);
        let key_policy = Arc::new(AttributeKeyPolicy::parse(&config.partition_key_strategy)?);
        Self::new(config, listing, cleaner, key_policy, store).await
    }

    pub fn phase(&self) -> MonitorPhase {
        MonitorPhase::from_u8(self.inner.phase.load(Ordering::SeqCst))
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.sets.scheduled.len()
    }

    pub fn scanned_count(&self) -> usize {
        self.inner.sets.scanned.len()
    }

    pub fn completed_count(&self) -> usize {
        self.inner.sets.completed.len()
    }

    /// Last snapshot read to the end of the state log.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.inner.snapshot.read())
    }

    /// Refreshes the store and caches its snapshot. On failure the previous
    /// snapshot is kept and `false` is returned.
    pub async fn sync_to_end(&self, timeout: Duration) -> bool {
        match self.inner.store.refresh(timeout).await {
            Ok(()) => {
                let snapshot = Arc::new(self.inner.store.snapshot());
                debug!(
                    log_position = snapshot.offset(),
                    "read state log to end and updated snapshot"
                );
                *self.inner.snapshot.write() = snapshot;
                true
            }
            Err(StoreError::Timeout(_)) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "failed to reach end of state log quickly enough"
                );
                false
            }
            Err(err) => {
                warn!(error = %err, "failed to read state log to end");
                false
            }
        }
    }

    fn recover_completed(&self) {
        let snapshot = self.snapshot();
        let mut recovered = 0usize;
        for (key, record) in snapshot.iter() {
            if record.status.is_completed() {
                self.inner
                    .sets
                    .completed
                    .push(record.clone().with_key(key.clone()));
                recovered += 1;
            }
        }
        info!(count = recovered, "recovered completed files from a previous run");
    }

    /// Periodic entrypoint: cleans up completed files, then scans for new
    /// ones and signals `host` when a batch is ready to be pulled.
    pub async fn on_tick(&self, host: &dyn TaskReconfigurationRequester) {
        self.clean_up_completed_files().await;

        if self.phase() != MonitorPhase::Running {
            info!("monitor is not running; skipping file system listing");
            return;
        }
        if self.inner.reconfiguration_requested.load(Ordering::SeqCst) {
            info!("task reconfiguration already requested; skipping file system listing");
            return;
        }
        if self.update_files().await {
            info!("requesting task reconfiguration");
            self.inner
                .reconfiguration_requested
                .store(true, Ordering::SeqCst);
            host.request_task_reconfiguration();
        }
    }

    /// Drains the completed queue through the cleanup policy. Cleaned records
    /// are persisted, failed ones are queued again for the next tick.
    pub async fn clean_up_completed_files(&self) {
        let batch = self.inner.sets.completed.drain_all();
        if batch.is_empty() {
            debug!("no completed files to clean up");
            return;
        }

        info!(count = batch.len(), "cleaning up completed files");
        let results = self.inner.cleaner.apply(batch).await;
        for (object, outcome) in results {
            match (outcome, object.key().cloned()) {
                (CleanupOutcome::Succeed, Some(key)) => {
                    let cleaned = object.with_status(FileObjectStatus::Cleaned);
                    self.inner.store.put_async(key, cleaned);
                }
                (CleanupOutcome::Succeed, None) => {
                    error!(uri = %object.metadata.uri, "cleaned file has no partition key; cannot persist");
                }
                (CleanupOutcome::Fail, _) => {
                    warn!(uri = %object.metadata.uri, "postponing cleanup");
                    self.inner.sets.completed.push(object);
                }
            }
        }
        info!("finished cleaning up completed files");
    }

    /// Scans the listing and publishes schedulable files. Returns true when
    /// the host should be asked to pull them.
    async fn update_files(&self) -> bool {
        let mut gate = self.inner.gate.lock().await;
        let sets = &self.inner.sets;

        let idle = sets.scheduled.is_empty();
        let reconfigure_after = self.inner.config.reconfiguration_after_timeout();
        if !idle && reconfigure_after.is_none() {
            info!(
                scheduled = sets.scheduled.len(),
                "scheduled files still being processed; skipping file system listing"
            );
            return false;
        }

        let synced = self.sync_to_end(self.inner.config.read_to_end_timeout()).await;
        if idle && !synced {
            warn!("state log could not be read to end; skipping file system listing");
            return false;
        }

        let started = Instant::now();
        let listed = match self.inner.listing.list_objects().await {
            Ok(listed) => listed,
            Err(err) => {
                warn!(listing = self.inner.listing.name(), error = %err, "file system listing failed");
                return false;
            }
        };
        info!(
            count = listed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completed file system listing"
        );

        let snapshot = self.inner.store.snapshot();
        let candidates =
            match scan::dedup_candidates(listed, &snapshot, self.inner.key_policy.as_ref()) {
                Ok(candidates) => candidates,
                Err(ScanRejection::Conflicts(conflicts)) => {
                    for conflict in &conflicts {
                        error!(
                            partition_key = %conflict.key,
                            files = ?conflict.uris,
                            "duplicate partition key detected"
                        );
                    }
                    error!(
                        conflicts = conflicts.len(),
                        strategy = %self.inner.config.partition_key_strategy,
                        "scan ignored; consider a more selective partition key strategy"
                    );
                    return false;
                }
                Err(ScanRejection::KeyPolicy(err)) => {
                    error!(error = %err, "scan ignored; partition key could not be derived");
                    return false;
                }
            };

        if let Some(delay) = reconfigure_after
            && !idle
        {
            if candidates
                .keys()
                .all(|key| sets.scheduled.contains_key(key))
            {
                info!(
                    scheduled = sets.scheduled.len(),
                    "scheduled files still being processed and no new files found"
                );
                return false;
            }
            let deadline = *gate
                .next_allowed_reconfiguration
                .get_or_insert_with(|| Instant::now() + delay);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                info!(
                    scheduled = sets.scheduled.len(),
                    remaining_ms = remaining.as_millis() as u64,
                    "new files detected while others are processed; delaying task reconfiguration"
                );
                return false;
            }
        }

        gate.next_allowed_reconfiguration = None;
        for (key, metadata) in candidates {
            sets.scanned.insert(key, metadata);
        }
        self.inner.scan_published.notify_waiters();
        drop(gate);

        info!(
            count = sets.scanned.len(),
            "finished lookup for new files to schedule"
        );
        !sets.scanned.is_empty() && self.phase() == MonitorPhase::Running
    }

    /// Host pull entrypoint: converges on a batch of at most `max_groups`
    /// groups built from up to `max_files` newly scanned files.
    ///
    /// The first call only marks the monitor running and returns nothing, so
    /// the host starts from an empty assignment. Scanned files and the
    /// pending reconfiguration request are always reset before returning.
    pub async fn partition_files_and_get(
        &self,
        max_groups: usize,
        max_files: usize,
    ) -> Vec<Vec<Url>> {
        match self.inner.phase.compare_exchange(
            MonitorPhase::NotStarted as u8,
            MonitorPhase::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                info!("started file system monitor");
                return Vec::new();
            }
            Err(current) if MonitorPhase::from_u8(current) == MonitorPhase::Stopped => {
                info!("monitor is stopped; nothing to schedule");
                return Vec::new();
            }
            Err(_) => {}
        }

        self.wait_for_scanned().await;

        let gate = self.inner.gate.lock().await;
        let groups = if self.inner.sets.scanned.is_empty() {
            Vec::new()
        } else {
            self.converge(max_groups, max_files).await
        };
        self.inner.sets.scanned.clear();
        self.inner
            .reconfiguration_requested
            .store(false, Ordering::SeqCst);
        drop(gate);

        if groups.is_empty() {
            warn!("no files to schedule; the listing was not scanned in time or found nothing new");
        }
        groups
    }

    async fn wait_for_scanned(&self) {
        let deadline = Instant::now() + self.inner.config.task_assignment_wait();
        loop {
            let notified = self.inner.scan_published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inner.sets.scanned.is_empty() {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            info!(
                remaining_ms = remaining.as_millis() as u64,
                "no file to schedule; waiting for the next scan"
            );
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return;
            }
        }
    }

    async fn converge(&self, max_groups: usize, max_files: usize) -> Vec<Vec<Url>> {
        let sets = &self.inner.sets;
        let mut phase = SchedulingPhase::start();
        let mut staged: Vec<PartitionKey> = Vec::new();
        let mut groups = Vec::new();

        loop {
            match phase {
                SchedulingPhase::Preparing { attempt } => {
                    for key in staged.drain(..) {
                        sets.scheduled.remove(&key);
                    }
                    sets.changed.store(false, Ordering::SeqCst);
                    info!(
                        attempt,
                        max_attempts = MAX_SCHEDULE_ATTEMPTS,
                        "preparing next scheduling from scanned files"
                    );
                    if !self.sync_to_end(self.inner.config.read_to_end_timeout()).await {
                        warn!(attempt, "state log not read to end while scheduling");
                    }
                    staged = self.stage_scanned(max_files);
                    let scheduled = sets
                        .scheduled
                        .iter()
                        .map(|entry| entry.value().clone())
                        .collect();
                    groups = partition_by_last_modified(scheduled, max_groups);
                    phase = phase.prepared();
                }
                SchedulingPhase::Validating { attempt } => {
                    let changed = sets.changed.load(Ordering::SeqCst);
                    phase = phase.validated(changed);
                    if changed && !phase.is_terminal() {
                        warn!(attempt, "state updates received while preparing files to schedule");
                    }
                }
                SchedulingPhase::Converged => {
                    info!(
                        groups = groups.len(),
                        scheduled = sets.scheduled.len(),
                        "scheduling converged"
                    );
                    return groups;
                }
                SchedulingPhase::Aborted => {
                    warn!(
                        max_attempts = MAX_SCHEDULE_ATTEMPTS,
                        "failed to prepare files to schedule; state kept changing"
                    );
                    sets.scheduled.clear();
                    return Vec::new();
                }
            }
        }
    }

    /// Copies up to `max_files` scanned files that are not scheduled yet,
    /// oldest first, into the scheduled set. Returns the staged keys.
    fn stage_scanned(&self, max_files: usize) -> Vec<PartitionKey> {
        let sets = &self.inner.sets;
        let mut candidates: Vec<(PartitionKey, FileObjectMeta)> = sets
            .scanned
            .iter()
            .filter(|entry| !sets.scheduled.contains_key(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if candidates.len() > max_files {
            candidates.sort_by(|(_, a), (_, b)| {
                a.last_modified
                    .cmp(&b.last_modified)
                    .then_with(|| a.uri.cmp(&b.uri))
            });
            candidates.truncate(max_files);
        }

        candidates
            .into_iter()
            .filter_map(|(key, metadata)| {
                sets.scheduled
                    .insert(key.clone(), metadata)
                    .is_none()
                    .then_some(key)
            })
            .collect()
    }

    /// Final drain: reads the state log to the end and runs one last cleanup.
    /// Only the first call does anything; errors and panics are logged.
    pub async fn close(&self) {
        let previous = self
            .inner
            .phase
            .swap(MonitorPhase::Stopped as u8, Ordering::SeqCst);
        if MonitorPhase::from_u8(previous) == MonitorPhase::Stopped {
            return;
        }

        info!("closing file system monitor");
        let drained = AssertUnwindSafe(async {
            self.sync_to_end(self.inner.config.read_to_end_timeout()).await;
            self.clean_up_completed_files().await;
        })
        .catch_unwind()
        .await;
        match drained {
            Ok(()) => info!("closed file system monitor"),
            Err(_) => error!("unexpected panic while closing file system monitor"),
        }
    }
}
