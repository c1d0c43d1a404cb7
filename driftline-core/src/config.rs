use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Global knobs that tune monitor behaviour.
///
/// All fields carry defaults so a deployment only has to spell out what it
/// overrides, typically the listing root and the cleanup policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of the built-in ticker driving `on_tick` (milliseconds).
    pub scan_interval_ms: u64,
    /// How long the pull entrypoint waits for a scan to publish candidates
    /// when none are pending (milliseconds).
    pub task_assignment_wait_ms: u64,
    /// Refresh-to-end timeout used once while the monitor is constructed.
    pub startup_read_to_end_timeout_ms: u64,
    /// Refresh-to-end timeout used by scans, scheduling attempts and close.
    pub read_to_end_timeout_ms: u64,
    /// When files are still being processed, rescanning is allowed only after
    /// this delay has elapsed since new files were first seen. `None` disables
    /// rescanning entirely until every scheduled file is cleaned.
    pub reconfiguration_after_timeout_ms: Option<u64>,
    /// `+`-joined attribute list used to derive partition keys, e.g. `uri` or
    /// `name+lastModified`.
    pub partition_key_strategy: String,
    /// Local filesystem listing settings.
    pub listing: ListingConfig,
    /// Post-processing applied to completed files.
    pub cleanup: CleanupConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 10_000,
            task_assignment_wait_ms: 15_000,
            startup_read_to_end_timeout_ms: 30_000,
            read_to_end_timeout_ms: 5_000,
            reconfiguration_after_timeout_ms: None,
            partition_key_strategy: "uri".to_string(),
            listing: ListingConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("scan_interval_ms", self.scan_interval_ms),
            ("task_assignment_wait_ms", self.task_assignment_wait_ms),
            (
                "startup_read_to_end_timeout_ms",
                self.startup_read_to_end_timeout_ms,
            ),
            ("read_to_end_timeout_ms", self.read_to_end_timeout_ms),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        if self.partition_key_strategy.trim().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "partition_key_strategy cannot be empty".to_string(),
            ));
        }
        self.listing.validate()
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn task_assignment_wait(&self) -> Duration {
        Duration::from_millis(self.task_assignment_wait_ms)
    }

    pub fn startup_read_to_end_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_read_to_end_timeout_ms)
    }

    pub fn read_to_end_timeout(&self) -> Duration {
        Duration::from_millis(self.read_to_end_timeout_ms)
    }

    pub fn reconfiguration_after_timeout(&self) -> Option<Duration> {
        self.reconfiguration_after_timeout_ms.map(Duration::from_millis)
    }
}

/// Settings for [`crate::listing::LocalFileSystemListing`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Resolved against the current directory when relative.
    pub root: PathBuf,
    pub recursive: bool,
    /// Only file names matching this pattern are listed.
    pub include_pattern: Option<String>,
    /// File names matching this pattern are skipped.
    pub exclude_pattern: Option<String>,
    pub min_size_bytes: u64,
    /// Skip dot-files.
    pub ignore_hidden: bool,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            recursive: true,
            include_pattern: None,
            exclude_pattern: None,
            min_size_bytes: 0,
            ignore_hidden: true,
        }
    }
}

impl ListingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(MonitorError::InvalidConfig(
                "listing.root cannot be empty".to_string(),
            ));
        }
        for (field, pattern) in [
            ("listing.include_pattern", &self.include_pattern),
            ("listing.exclude_pattern", &self.exclude_pattern),
        ] {
            if let Some(pattern) = pattern {
                Regex::new(pattern).map_err(|err| {
                    MonitorError::InvalidConfig(format!("{field}: {err}"))
                })?;
            }
        }
        Ok(())
    }
}

/// Cleanup policy selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CleanupConfig {
    /// Log completed files and leave them in place.
    #[default]
    Log,
    /// Delete completed files.
    Delete,
    /// Move successfully processed files to `success_dir`, failed ones to
    /// `failure_dir`.
    Move {
        success_dir: PathBuf,
        failure_dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.task_assignment_wait(), Duration::from_secs(15));
        assert_eq!(config.read_to_end_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconfiguration_after_timeout(), None);
        assert_eq!(config.cleanup, CleanupConfig::Log);
    }

    #[test]
    fn parses_partial_toml() {
        let config = MonitorConfig::from_toml_str(
            r#"
            scan_interval_ms = 2000
            reconfiguration_after_timeout_ms = 60000
            partition_key_strategy = "name+lastModified"

            [listing]
            root = "/data/inbox"
            include_pattern = '.*\.csv$'

            [cleanup]
            policy = "move"
            success_dir = "/data/done"
            failure_dir = "/data/error"
            "#,
        )
        .unwrap();

        assert_eq!(config.scan_interval(), Duration::from_secs(2));
        assert_eq!(
            config.reconfiguration_after_timeout(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.listing.root, PathBuf::from("/data/inbox"));
        assert!(config.listing.recursive);
        assert_eq!(config.task_assignment_wait_ms, 15_000);
        assert_eq!(
            config.cleanup,
            CleanupConfig::Move {
                success_dir: PathBuf::from("/data/done"),
                failure_dir: PathBuf::from("/data/error"),
            }
        );
    }

    #[test]
    fn rejects_zero_timeouts() {
        let err = MonitorConfig::from_toml_str("read_to_end_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, MonitorError::InvalidConfig(msg) if msg.contains("read_to_end")));
    }

    #[test]
    fn rejects_broken_patterns() {
        let err = MonitorConfig::from_toml_str(
            r#"
            [listing]
            exclude_pattern = "(unclosed"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidConfig(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "[cleanup]\npolicy = \"delete\"\n").unwrap();
        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.cleanup, CleanupConfig::Delete);
    }
}
