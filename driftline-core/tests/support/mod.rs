//! Shared helpers for driftline-core integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::{Duration, SystemTime};

use driftline_core::key_policy::{AttributeKeyPolicy, PartitionKeyPolicy};
use driftline_core::listing::InMemoryFs;
use driftline_core::model::{FileObject, FileObjectMeta, FileObjectStatus};
use driftline_core::store::{InMemoryStateStore, StateBackingStore};
use url::Url;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "driftline_core=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Seconds after the epoch, so listings sort predictably.
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
}

pub fn inbox(files: &[(&str, u64)]) -> Arc<InMemoryFs> {
    let fs = Arc::new(InMemoryFs::new());
    fs.add_dir("/inbox");
    for (name, secs) in files {
        fs.add_file(format!("/inbox/{name}"), 16, at(*secs));
    }
    fs
}

/// Worker stand-in: reports `statuses` for the file at `uri`, in order.
pub fn report(store: &InMemoryStateStore, uri: &Url, statuses: &[FileObjectStatus]) {
    let metadata = FileObjectMeta::new(uri.clone(), 16, chrono::Utc::now()).unwrap();
    let key = AttributeKeyPolicy::default()
        .to_partition_key(&metadata)
        .unwrap();
    for status in statuses {
        store.put_async(key.clone(), FileObject::new(metadata.clone(), *status));
    }
}

pub async fn settle(store: &InMemoryStateStore) {
    store.refresh(Duration::from_secs(2)).await.unwrap();
}
