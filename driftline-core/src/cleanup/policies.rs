use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use driftline_model::{FileObject, FileObjectStatus};
use tracing::{debug, info};

use super::FileCleanupPolicy;
use crate::error::{MonitorError, Result};
use crate::listing::FileSystem;

fn local_path(object: &FileObject) -> Result<PathBuf> {
    object.metadata.uri.to_file_path().map_err(|_| {
        MonitorError::Cleanup(format!(
            "not a local file: {}",
            object.metadata.string_uri()
        ))
    })
}

/// Leaves files in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCleanupPolicy;

#[async_trait]
impl FileCleanupPolicy for LogCleanupPolicy {
    async fn apply(&self, object: &FileObject) -> Result<()> {
        info!(
            uri = %object.metadata.uri,
            status = %object.status,
            "file object processed; leaving in place"
        );
        Ok(())
    }
}

/// Removes completed files. A file that is already gone counts as cleaned.
pub struct DeleteCleanupPolicy {
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for DeleteCleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteCleanupPolicy").finish_non_exhaustive()
    }
}

impl DeleteCleanupPolicy {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl FileCleanupPolicy for DeleteCleanupPolicy {
    async fn apply(&self, object: &FileObject) -> Result<()> {
        let path = local_path(object)?;
        match self.fs.remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "deleted processed file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file already removed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Moves files by outcome: `Completed` into the success directory, anything
/// else into the failure directory.
pub struct MoveCleanupPolicy {
    fs: Arc<dyn FileSystem>,
    success_dir: PathBuf,
    failure_dir: PathBuf,
}

impl fmt::Debug for MoveCleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveCleanupPolicy")
            .field("success_dir", &self.success_dir)
            .field("failure_dir", &self.failure_dir)
            .finish_non_exhaustive()
    }
}

impl MoveCleanupPolicy {
    pub fn new(fs: Arc<dyn FileSystem>, success_dir: PathBuf, failure_dir: PathBuf) -> Self {
        Self {
            fs,
            success_dir,
            failure_dir,
        }
    }

    fn target_dir(&self, status: FileObjectStatus) -> &Path {
        if status == FileObjectStatus::Completed {
            &self.success_dir
        } else {
            &self.failure_dir
        }
    }
}

#[async_trait]
impl FileCleanupPolicy for MoveCleanupPolicy {
    async fn apply(&self, object: &FileObject) -> Result<()> {
        let source = local_path(object)?;
        let target = self.target_dir(object.status).join(&object.metadata.name);
        if !self.fs.path_exists(&source).await && self.fs.path_exists(&target).await {
            debug!(target = %target.display(), "file already moved");
            return Ok(());
        }
        self.fs.rename(&source, &target).await?;
        info!(
            from = %source.display(),
            to = %target.display(),
            "moved processed file"
        );
        Ok(())
    }
}
