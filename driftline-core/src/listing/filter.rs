use std::fmt;

use driftline_model::FileObjectMeta;
use regex::Regex;

use crate::error::{MonitorError, Result};

/// Predicate applied to every listed file before it reaches the monitor.
pub trait FileListFilter: Send + Sync + fmt::Debug {
    fn accept(&self, metadata: &FileObjectMeta) -> bool;
}

/// Include/exclude patterns matched against the file name.
#[derive(Debug, Clone)]
pub struct RegexNameFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl RegexNameFilter {
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|err| {
                MonitorError::InvalidConfig(format!("invalid file name pattern '{pattern}': {err}"))
            })
        };
        Ok(Self {
            include: include.map(compile).transpose()?,
            exclude: exclude.map(compile).transpose()?,
        })
    }
}

impl FileListFilter for RegexNameFilter {
    fn accept(&self, metadata: &FileObjectMeta) -> bool {
        if let Some(include) = &self.include
            && !include.is_match(&metadata.name)
        {
            return false;
        }
        !self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(&metadata.name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MinSizeFilter {
    pub min_size_bytes: u64,
}

impl FileListFilter for MinSizeFilter {
    fn accept(&self, metadata: &FileObjectMeta) -> bool {
        metadata.size >= self.min_size_bytes
    }
}

/// Rejects dot-files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HiddenFileFilter;

impl FileListFilter for HiddenFileFilter {
    fn accept(&self, metadata: &FileObjectMeta) -> bool {
        !metadata.name.starts_with('.')
    }
}
