//! State backing store seam.
//!
//! The monitor never owns persisted state: workers advance record statuses
//! through an eventually-consistent, replicated store, and the monitor only
//! reads immutable snapshots and reacts to pushed change notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use driftline_model::{FileObject, PartitionKey, StateSnapshot};

use crate::error::StoreError;

pub mod memory;

pub use memory::InMemoryStateStore;

/// Callback interface invoked by the store, in log order, whenever a record
/// is written or removed. Implementations must not block: the store calls
/// them from its replication path.
pub trait StateUpdateListener: Send + Sync {
    fn on_state_update(&self, key: &PartitionKey, object: &FileObject);

    fn on_state_remove(&self, key: &PartitionKey);
}

/// Replicated record of file object states keyed by partition key.
#[async_trait]
pub trait StateBackingStore: Send + Sync {
    /// Starts replication. Records already in the log when this is called
    /// form the initial state and may be applied without notifying the
    /// listener; only later writes are guaranteed to be delivered to it.
    /// Callers recover existing records from [`snapshot`](Self::snapshot).
    async fn start(&self) -> Result<(), StoreError>;

    fn is_started(&self) -> bool;

    /// Reads the log up to its current end, bounded by `timeout`. Fails with
    /// [`StoreError::Timeout`] when the end is not reached in time.
    async fn refresh(&self, timeout: Duration) -> Result<(), StoreError>;

    /// Immutable view of every record applied so far.
    fn snapshot(&self) -> StateSnapshot;

    /// Fire-and-forget write; returns before the record is replicated.
    fn put_async(&self, key: PartitionKey, object: FileObject);

    fn set_update_listener(&self, listener: Arc<dyn StateUpdateListener>);
}
