use std::collections::HashMap;
use std::fmt;

use driftline_model::{FileObjectMeta, PartitionKey, StateSnapshot};
use thiserror::Error;

use crate::error::MonitorError;
use crate::key_policy::PartitionKeyPolicy;

/// Distinct file objects that mapped to the same partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConflict {
    pub key: PartitionKey,
    pub uris: Vec<String>,
}

impl fmt::Display for KeyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition_key={}, files={:?}", self.key, self.uris)
    }
}

/// Why a whole scan was discarded.
#[derive(Debug, Error)]
pub enum ScanRejection {
    #[error("{} partition key conflict(s) detected", .0.len())]
    Conflicts(Vec<KeyConflict>),

    #[error(transparent)]
    KeyPolicy(#[from] MonitorError),
}

/// A key may be (re)scheduled while unknown to the store or still startable.
pub(crate) fn may_schedule(snapshot: &StateSnapshot, key: &PartitionKey) -> bool {
    snapshot
        .get(key)
        .is_none_or(|record| record.status.is_startable())
}

/// Keys every listed file object and keeps the schedulable ones.
///
/// Fails closed: a single key shared by two distinct file objects, or a key
/// that cannot be derived, rejects the entire listing.
pub(crate) fn dedup_candidates(
    listed: Vec<FileObjectMeta>,
    snapshot: &StateSnapshot,
    policy: &dyn PartitionKeyPolicy,
) -> Result<HashMap<PartitionKey, FileObjectMeta>, ScanRejection> {
    let mut grouped: HashMap<PartitionKey, Vec<FileObjectMeta>> = HashMap::new();
    for metadata in listed {
        let key = policy.to_partition_key(&metadata)?;
        if !may_schedule(snapshot, &key) {
            continue;
        }
        let group = grouped.entry(key).or_default();
        if !group.contains(&metadata) {
            group.push(metadata);
        }
    }

    let mut conflicts: Vec<KeyConflict> = grouped
        .iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(key, group)| KeyConflict {
            key: key.clone(),
            uris: group.iter().map(|m| m.string_uri().to_string()).collect(),
        })
        .collect();
    if !conflicts.is_empty() {
        conflicts.sort_by(|a, b| a.key.cmp(&b.key));
        return Err(ScanRejection::Conflicts(conflicts));
    }

    Ok(grouped
        .into_iter()
        .filter_map(|(key, mut group)| group.pop().map(|metadata| (key, metadata)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_policy::AttributeKeyPolicy;
    use chrono::DateTime;
    use driftline_model::{FileObject, FileObjectStatus};
    use std::path::Path;

    fn meta(path: &str, millis: i64) -> FileObjectMeta {
        FileObjectMeta::from_local_path(
            Path::new(path),
            1,
            DateTime::from_timestamp_millis(millis).unwrap(),
        )
        .unwrap()
    }

    fn uri_key(path: &str) -> PartitionKey {
        AttributeKeyPolicy::default()
            .to_partition_key(&meta(path, 0))
            .unwrap()
    }

    fn snapshot(entries: &[(&str, FileObjectStatus)]) -> StateSnapshot {
        let states = entries
            .iter()
            .map(|(path, status)| (uri_key(path), FileObject::new(meta(path, 0), *status)))
            .collect();
        StateSnapshot::new(entries.len() as u64, states)
    }

    #[test]
    fn admits_unknown_and_startable_keys_only() {
        let snapshot = snapshot(&[
            ("/in/started.csv", FileObjectStatus::Started),
            ("/in/reading.csv", FileObjectStatus::Reading),
            ("/in/done.csv", FileObjectStatus::Completed),
            ("/in/cleaned.csv", FileObjectStatus::Cleaned),
            ("/in/invalid.csv", FileObjectStatus::Invalid),
        ]);
        let listed = vec![
            meta("/in/new.csv", 1),
            meta("/in/started.csv", 1),
            meta("/in/reading.csv", 1),
            meta("/in/done.csv", 1),
            meta("/in/cleaned.csv", 1),
            meta("/in/invalid.csv", 1),
        ];

        let admitted =
            dedup_candidates(listed, &snapshot, &AttributeKeyPolicy::default()).unwrap();

        let mut names: Vec<_> = admitted.values().map(|m| m.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["new.csv", "reading.csv", "started.csv"]);
    }

    #[test]
    fn identical_duplicates_collapse() {
        let listed = vec![meta("/in/a.csv", 1), meta("/in/a.csv", 1)];
        let admitted = dedup_candidates(
            listed,
            &StateSnapshot::empty(),
            &AttributeKeyPolicy::default(),
        )
        .unwrap();
        assert_eq!(admitted.len(), 1);
    }

    #[test]
    fn conflicting_keys_reject_the_whole_scan() {
        let policy = AttributeKeyPolicy::parse("name").unwrap();
        let listed = vec![
            meta("/in/x/a.csv", 1),
            meta("/in/y/a.csv", 2),
            meta("/in/x/b.csv", 1),
            meta("/in/y/b.csv", 1),
            meta("/in/unique.csv", 1),
        ];

        let err = dedup_candidates(listed, &StateSnapshot::empty(), &policy).unwrap_err();
        let conflicts = match err {
            ScanRejection::Conflicts(conflicts) => conflicts,
            other => panic!("expected conflicts, got {other:?}"),
        };
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.iter().all(|c| c.uris.len() == 2));
        assert!(conflicts[0].uris.contains(&"file:///in/x/a.csv".to_string()));
        assert!(conflicts[0].uris.contains(&"file:///in/y/a.csv".to_string()));
    }

    #[test]
    fn conflicts_on_non_schedulable_keys_are_ignored() {
        let policy = AttributeKeyPolicy::parse("name").unwrap();
        let done = policy.to_partition_key(&meta("/in/a.csv", 0)).unwrap();
        let snapshot = StateSnapshot::new(
            1,
            [(done, FileObject::new(meta("/in/a.csv", 0), FileObjectStatus::Cleaned))]
                .into_iter()
                .collect(),
        );
        let listed = vec![meta("/in/x/a.csv", 1), meta("/in/y/a.csv", 2)];
        let admitted = dedup_candidates(listed, &snapshot, &policy).unwrap();
        assert!(admitted.is_empty());
    }

    #[test]
    fn key_policy_failure_aborts_scan() {
        let policy = AttributeKeyPolicy::parse("digest").unwrap();
        let listed = vec![meta("/in/a.csv", 1).with_content_digest("abc"), meta("/in/b.csv", 1)];
        let err = dedup_candidates(listed, &StateSnapshot::empty(), &policy).unwrap_err();
        assert!(matches!(err, ScanRejection::KeyPolicy(MonitorError::PartitionKey { .. })));
    }
}
