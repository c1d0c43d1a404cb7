use std::fmt;

/// Lifecycle of a persisted file object record.
///
/// Workers advance the status through the state store; the monitor only
/// observes transitions. Statuses fall into three families:
/// - startable (`Scheduled`, `Started`, `Reading`): the file has not progressed
///   past discovery/processing and may legitimately be (re)scheduled
/// - completed (`Completed`, `Failed`): processing finished, cleanup pending
/// - `Cleaned`: terminal, cleanup done
///
/// `Invalid` and `Committed` belong to none of them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum FileObjectStatus {
    Scheduled,
    Invalid,
    Started,
    Reading,
    Committed,
    Failed,
    Completed,
    Cleaned,
}

impl FileObjectStatus {
    pub const STARTABLE: [FileObjectStatus; 3] = [
        FileObjectStatus::Scheduled,
        FileObjectStatus::Started,
        FileObjectStatus::Reading,
    ];

    pub const COMPLETED: [FileObjectStatus; 2] =
        [FileObjectStatus::Completed, FileObjectStatus::Failed];

    pub fn is_one_of(&self, statuses: &[FileObjectStatus]) -> bool {
        statuses.contains(self)
    }

    pub fn is_startable(&self) -> bool {
        self.is_one_of(&Self::STARTABLE)
    }

    pub fn is_completed(&self) -> bool {
        self.is_one_of(&Self::COMPLETED)
    }

    pub fn is_cleaned(&self) -> bool {
        matches!(self, FileObjectStatus::Cleaned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileObjectStatus::Scheduled => "SCHEDULED",
            FileObjectStatus::Invalid => "INVALID",
            FileObjectStatus::Started => "STARTED",
            FileObjectStatus::Reading => "READING",
            FileObjectStatus::Committed => "COMMITTED",
            FileObjectStatus::Failed => "FAILED",
            FileObjectStatus::Completed => "COMPLETED",
            FileObjectStatus::Cleaned => "CLEANED",
        }
    }
}

impl fmt::Display for FileObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
