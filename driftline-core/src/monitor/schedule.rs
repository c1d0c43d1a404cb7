use driftline_model::FileObjectMeta;
use url::Url;

/// Attempts made to prepare a batch before giving up on a changing state.
pub const MAX_SCHEDULE_ATTEMPTS: u32 = 3;

/// Progress of one scheduling convergence run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPhase {
    /// Staging scanned files and building groups for `attempt`.
    Preparing { attempt: u32 },
    /// Checking whether state notifications arrived during `attempt`.
    Validating { attempt: u32 },
    Converged,
    Aborted,
}

impl SchedulingPhase {
    pub fn start() -> Self {
        SchedulingPhase::Preparing { attempt: 1 }
    }

    pub fn prepared(self) -> Self {
        match self {
            SchedulingPhase::Preparing { attempt } => SchedulingPhase::Validating { attempt },
            other => other,
        }
    }

    /// Resolves a validation: a stable state converges, a changed one retries
    /// until the attempt ceiling is reached.
    pub fn validated(self, changed: bool) -> Self {
        match self {
            SchedulingPhase::Validating { .. } if !changed => SchedulingPhase::Converged,
            SchedulingPhase::Validating { attempt } if attempt >= MAX_SCHEDULE_ATTEMPTS => {
                SchedulingPhase::Aborted
            }
            SchedulingPhase::Validating { attempt } => SchedulingPhase::Preparing {
                attempt: attempt + 1,
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulingPhase::Converged | SchedulingPhase::Aborted)
    }
}

/// Splits `items` into `num_groups` contiguous groups whose sizes differ by
/// at most one; the leading groups take the remainder.
pub fn group_partitions<T>(items: Vec<T>, num_groups: usize) -> Vec<Vec<T>> {
    if num_groups == 0 {
        return Vec::new();
    }
    let per_group = items.len() / num_groups;
    let remainder = items.len() % num_groups;

    let mut groups = Vec::with_capacity(num_groups);
    let mut items = items.into_iter();
    for index in 0..num_groups {
        let size = per_group + usize::from(index < remainder);
        groups.push(items.by_ref().take(size).collect());
    }
    groups
}

/// Orders file objects by modification time (uri breaks ties) and groups
/// their uris into at most `max_groups` balanced groups.
pub fn partition_by_last_modified(
    mut objects: Vec<FileObjectMeta>,
    max_groups: usize,
) -> Vec<Vec<Url>> {
    objects.sort_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.uri.cmp(&b.uri))
    });
    let num_groups = objects.len().min(max_groups);
    let uris = objects.into_iter().map(|object| object.uri).collect();
    group_partitions(uris, num_groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::path::Path;

    #[test]
    fn phase_converges_when_unchanged() {
        let phase = SchedulingPhase::start().prepared();
        assert_eq!(phase, SchedulingPhase::Validating { attempt: 1 });
        assert_eq!(phase.validated(false), SchedulingPhase::Converged);
    }

    #[test]
    fn phase_aborts_after_ceiling() {
        let mut phase = SchedulingPhase::start();
        let mut attempts = 0;
        while !phase.is_terminal() {
            if let SchedulingPhase::Preparing { .. } = phase {
                attempts += 1;
            }
            phase = phase.prepared().validated(true);
        }
        assert_eq!(phase, SchedulingPhase::Aborted);
        assert_eq!(attempts, MAX_SCHEDULE_ATTEMPTS);
    }

    #[test]
    fn groups_are_contiguous_and_balanced() {
        let groups = group_partitions((1..=7).collect(), 3);
        assert_eq!(groups, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]]);

        let groups = group_partitions(vec![1, 2], 2);
        assert_eq!(groups, vec![vec![1], vec![2]]);

        assert!(group_partitions(vec![1, 2, 3], 0).is_empty());
    }

    #[test]
    fn partitions_by_modification_time_across_groups() {
        let meta = |path: &str, secs: i64| {
            FileObjectMeta::from_local_path(
                Path::new(path),
                1,
                DateTime::from_timestamp(secs, 0).unwrap(),
            )
            .unwrap()
        };
        let objects = vec![
            meta("/in/d.csv", 40),
            meta("/in/b.csv", 20),
            meta("/in/a.csv", 10),
            meta("/in/c.csv", 30),
        ];

        let groups = partition_by_last_modified(objects, 3);
        let names: Vec<Vec<&str>> = groups
            .iter()
            .map(|group| group.iter().map(|uri| uri.path()).collect())
            .collect();
        assert_eq!(
            names,
            vec![vec!["/in/a.csv", "/in/b.csv"], vec!["/in/c.csv"], vec!["/in/d.csv"]]
        );
    }

    #[test]
    fn fewer_objects_than_groups_yields_singletons() {
        let meta = FileObjectMeta::from_local_path(
            Path::new("/in/a.csv"),
            1,
            DateTime::from_timestamp(1, 0).unwrap(),
        )
        .unwrap();
        let groups = partition_by_last_modified(vec![meta], 8);
        assert_eq!(groups.len(), 1);
        assert!(partition_by_last_modified(Vec::new(), 8).is_empty());
    }
}
