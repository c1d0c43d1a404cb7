//! File object listings.
//!
//! A listing enumerates the file objects currently available at a source and
//! describes each one with immutable [`FileObjectMeta`]. Listings are pure
//! reads; deduplication against persisted state happens in the monitor.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driftline_model::FileObjectMeta;
use tracing::{debug, warn};

use crate::config::ListingConfig;
use crate::error::{MonitorError, Result};

pub mod filter;
pub mod fs;

pub use filter::{FileListFilter, HiddenFileFilter, MinSizeFilter, RegexNameFilter};
pub use fs::{FileSystem, FsMetadata, InMemoryFs, ReadDirStream, RealFs};

#[async_trait]
pub trait FileSystemListing: Send + Sync {
    /// Lists every file object currently available. May be slow.
    async fn list_objects(&self) -> Result<Vec<FileObjectMeta>>;

    fn name(&self) -> &str;
}

/// Breadth-first walk of a local directory tree.
pub struct LocalFileSystemListing {
    root: PathBuf,
    recursive: bool,
    fs: Arc<dyn FileSystem>,
    filters: Vec<Box<dyn FileListFilter>>,
}

impl fmt::Debug for LocalFileSystemListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFileSystemListing")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .field("filters", &self.filters)
            .finish()
    }
}

impl LocalFileSystemListing {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::new_with_fs(root, Arc::new(RealFs::new()))
    }

    /// Listing over a custom filesystem (useful for tests). A relative root
    /// is resolved against the current directory once, here.
    pub fn new_with_fs(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            recursive: true,
            fs,
            filters: Vec::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_filter(mut self, filter: impl FileListFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, metadata: &FileObjectMeta) -> bool {
        self.filters.iter().all(|filter| filter.accept(metadata))
    }

    fn describe(path: &Path, md: &FsMetadata) -> Result<FileObjectMeta> {
        let last_modified = md
            .modified
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Ok(FileObjectMeta::from_local_path(path, md.len, last_modified)?)
    }
}

#[async_trait]
impl FileSystemListing for LocalFileSystemListing {
    async fn list_objects(&self) -> Result<Vec<FileObjectMeta>> {
        if !self.fs.path_exists(&self.root).await {
            return Err(MonitorError::Listing(format!(
                "root does not exist: {}",
                self.root.display()
            )));
        }

        let mut found = Vec::new();
        let mut pending = VecDeque::from([self.root.clone()]);
        while let Some(dir) = pending.pop_front() {
            let mut entries = match self.fs.read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if dir != self.root => {
                    // Subdirectories may vanish or turn unreadable mid-walk.
                    warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            while let Some(path) = entries.next_entry().await? {
                let md = match self.fs.metadata(&path).await {
                    Ok(md) => md,
                    Err(err) => {
                        // Files may vanish between read_dir and stat.
                        warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                        continue;
                    }
                };
                if md.is_dir {
                    if self.recursive {
                        pending.push_back(path);
                    }
                    continue;
                }
                if !md.is_file {
                    continue;
                }
                let metadata = Self::describe(&path, &md)?;
                if self.accepts(&metadata) {
                    found.push(metadata);
                }
            }
        }

        debug!(root = %self.root.display(), count = found.len(), "listed file objects");
        Ok(found)
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

impl ListingConfig {
    /// Builds the configured listing over `fs`.
    pub fn build(&self, fs: Arc<dyn FileSystem>) -> Result<LocalFileSystemListing> {
        self.validate()?;
        let mut listing =
            LocalFileSystemListing::new_with_fs(&self.root, fs).recursive(self.recursive);
        if self.include_pattern.is_some() || self.exclude_pattern.is_some() {
            listing = listing.with_filter(RegexNameFilter::new(
                self.include_pattern.as_deref(),
                self.exclude_pattern.as_deref(),
            )?);
        }
        if self.min_size_bytes > 0 {
            listing = listing.with_filter(MinSizeFilter {
                min_size_bytes: self.min_size_bytes,
            });
        }
        if self.ignore_hidden {
            listing = listing.with_filter(HiddenFileFilter);
        }
        Ok(listing)
    }
}
