//! Core data model definitions shared across driftline crates.
//!
//! Everything here is plain data: the monitor engine in `driftline-core` owns
//! the behaviour, this crate only describes what a discovered file looks like,
//! how it is identified and which lifecycle state a persisted record is in.

pub mod error;
pub mod file_object;
pub mod partition_key;
pub mod snapshot;
pub mod status;

pub use error::{ModelError, Result as ModelResult};
pub use file_object::{FileObject, FileObjectMeta, FileObjectOffset};
pub use partition_key::PartitionKey;
pub use snapshot::StateSnapshot;
pub use status::FileObjectStatus;
