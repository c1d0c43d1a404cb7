//! Post-processing of completed file objects.
//!
//! The monitor drains every completed record once per tick and hands the whole
//! batch to a [`BatchFileCleanupPolicy`]. Records reported as
//! [`CleanupOutcome::Succeed`] are marked cleaned in the state store, the
//! others are retried on the next tick.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use driftline_model::FileObject;
use tracing::warn;

use crate::config::CleanupConfig;
use crate::error::Result;
use crate::listing::FileSystem;

mod policies;

pub use policies::{DeleteCleanupPolicy, LogCleanupPolicy, MoveCleanupPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Succeed,
    Fail,
}

/// Per-record outcomes of one cleanup batch, in input order.
#[derive(Debug, Default)]
pub struct FileCleanupResultSet {
    results: Vec<(FileObject, CleanupOutcome)>,
}

impl FileCleanupResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: FileObject, outcome: CleanupOutcome) {
        self.results.push((object, outcome));
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &FileObject> {
        self.results
            .iter()
            .filter(|(_, outcome)| *outcome == CleanupOutcome::Succeed)
            .map(|(object, _)| object)
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileObject> {
        self.results
            .iter()
            .filter(|(_, outcome)| *outcome == CleanupOutcome::Fail)
            .map(|(object, _)| object)
    }
}

impl IntoIterator for FileCleanupResultSet {
    type Item = (FileObject, CleanupOutcome);
    type IntoIter = std::vec::IntoIter<(FileObject, CleanupOutcome)>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl FromIterator<(FileObject, CleanupOutcome)> for FileCleanupResultSet {
    fn from_iter<I: IntoIterator<Item = (FileObject, CleanupOutcome)>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Bulk cleanup entrypoint used by the monitor. Implementations may perform a
/// single aggregated side effect for the whole batch.
#[async_trait]
pub trait BatchFileCleanupPolicy: Send + Sync {
    async fn apply(&self, objects: Vec<FileObject>) -> FileCleanupResultSet;
}

/// Cleanup of a single record.
#[async_trait]
pub trait FileCleanupPolicy: Send + Sync {
    async fn apply(&self, object: &FileObject) -> Result<()>;
}

/// Runs a [`FileCleanupPolicy`] record by record; an error fails only that
/// record.
pub struct DelegateBatchCleanupPolicy<P> {
    inner: P,
}

impl<P> DelegateBatchCleanupPolicy<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: fmt::Debug> fmt::Debug for DelegateBatchCleanupPolicy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DelegateBatchCleanupPolicy")
            .field(&self.inner)
            .finish()
    }
}

#[async_trait]
impl<P: FileCleanupPolicy> BatchFileCleanupPolicy for DelegateBatchCleanupPolicy<P> {
    async fn apply(&self, objects: Vec<FileObject>) -> FileCleanupResultSet {
        let mut results = FileCleanupResultSet::new();
        for object in objects {
            let outcome = match self.inner.apply(&object).await {
                Ok(()) => CleanupOutcome::Succeed,
                Err(err) => {
                    warn!(
                        uri = %object.metadata.uri,
                        error = %err,
                        "cleanup failed; will retry on next tick"
                    );
                    CleanupOutcome::Fail
                }
            };
            results.push(object, outcome);
        }
        results
    }
}

impl CleanupConfig {
    /// Builds the configured policy over `fs`.
    pub fn build(&self, fs: Arc<dyn FileSystem>) -> Arc<dyn BatchFileCleanupPolicy> {
        match self {
            CleanupConfig::Log => Arc::new(DelegateBatchCleanupPolicy::new(LogCleanupPolicy)),
            CleanupConfig::Delete => {
                Arc::new(DelegateBatchCleanupPolicy::new(DeleteCleanupPolicy::new(fs)))
            }
            CleanupConfig::Move {
                success_dir,
                failure_dir,
            } => Arc::new(DelegateBatchCleanupPolicy::new(MoveCleanupPolicy::new(
                fs,
                success_dir.clone(),
                failure_dir.clone(),
            ))),
        }
    }
}
