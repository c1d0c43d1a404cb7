//! # Driftline Core
//!
//! Engine that watches a source of files, reconciles what it finds against a
//! replicated, eventually-consistent state store and hands out grouped
//! batches of files to a host's worker tasks.
//!
//! ## Architecture
//!
//! - [`monitor`]: the [`FileSystemMonitor`] engine, its scheduling state
//!   machine and the periodic [`MonitorTicker`]
//! - [`store`]: the [`StateBackingStore`] seam plus an in-process
//!   implementation
//! - [`listing`]: file listings over a [`listing::FileSystem`] abstraction
//! - [`key_policy`]: derivation of partition keys from file metadata
//! - [`cleanup`]: post-processing of completed files
//! - [`config`]: TOML-loadable configuration
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use driftline_core::{
//!     FileSystemMonitor, MonitorConfig, MonitorTicker, NotifyReconfigurationRequester,
//!     listing::RealFs, store::InMemoryStateStore,
//! };
//!
//! # async fn run() -> driftline_core::Result<()> {
//! let config = MonitorConfig::load("monitor.toml")?;
//! let period = config.scan_interval();
//! let monitor = FileSystemMonitor::from_config(
//!     config,
//!     Arc::new(RealFs::new()),
//!     Arc::new(InMemoryStateStore::new()),
//! )
//! .await?;
//!
//! let host = Arc::new(NotifyReconfigurationRequester::new());
//! let ticker = MonitorTicker::spawn(monitor.clone(), host.clone(), period);
//! monitor.partition_files_and_get(4, 100).await;
//! loop {
//!     host.requested().await;
//!     let groups = monitor.partition_files_and_get(4, 100).await;
//!     if groups.is_empty() {
//!         break;
//!     }
//! }
//! ticker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod error;
pub mod key_policy;
pub mod listing;
pub mod monitor;
pub mod store;

pub use config::{CleanupConfig, ListingConfig, MonitorConfig};
pub use error::{MonitorError, Result, StoreError};
pub use monitor::{
    FileSystemMonitor, MonitorPhase, MonitorTicker, NotifyReconfigurationRequester,
    TaskReconfigurationRequester,
};
pub use store::{StateBackingStore, StateUpdateListener};

pub use driftline_model as model;
