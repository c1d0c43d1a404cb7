use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

/// Async filesystem abstraction used by listings and cleanup policies.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn path_exists(&self, path: &Path) -> bool;

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>>;

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Moves `from` to `to`, creating the destination directory first.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Metadata a listing needs to describe a file object.
#[derive(Debug, Clone, Copy)]
pub struct FsMetadata {
    pub is_dir: bool,
    pub is_file: bool,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Async directory iterator.
#[async_trait]
pub trait ReadDirStream {
    /// Next entry path, `None` once exhausted.
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>>;
}

fn with_path(err: io::Error, op: &str, path: &Path) -> io::Error {
    io::Error::new(err.kind(), format!("{op} failed for {}: {err}", path.display()))
}

/// Filesystem backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for RealFs {
    async fn path_exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let inner = tokio::fs::read_dir(path)
            .await
            .map_err(|err| with_path(err, "read_dir", path))?;
        Ok(Box::new(RealReadDir { inner }))
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        let md = tokio::fs::metadata(path)
            .await
            .map_err(|err| with_path(err, "metadata", path))?;
        Ok(FsMetadata {
            is_dir: md.is_dir(),
            is_file: md.is_file(),
            len: md.len(),
            modified: md.modified().ok(),
        })
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| with_path(err, "create_dir_all", parent))?;
        }
        tokio::fs::rename(from, to)
            .await
            .map_err(|err| with_path(err, "rename", from))
    }
}

struct RealReadDir {
    inner: tokio::fs::ReadDir,
}

#[async_trait]
impl ReadDirStream for RealReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.inner.next_entry().await?.map(|entry| entry.path()))
    }
}

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File { len: u64, modified: SystemTime },
}

/// In-memory filesystem for tests.
///
/// Paths are taken literally. Interior mutability lets tests add, remove
/// and touch files while a monitor holds the filesystem behind an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryFs {
    nodes: parking_lot::RwLock<BTreeMap<PathBuf, Node>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir<P: Into<PathBuf>>(&self, path: P) {
        let path = path.into();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.entry(path).or_insert(Node::Dir);
    }

    /// Adds or replaces a file.
    pub fn add_file<P: Into<PathBuf>>(&self, path: P, len: u64, modified: SystemTime) {
        let path = path.into();
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &path);
        nodes.insert(path, Node::File { len, modified });
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.read().contains_key(path)
    }

    fn ensure_parents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    fn not_found(op: &str, path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{op} on missing path: {}", path.display()),
        )
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn path_exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Box<dyn ReadDirStream + Send>> {
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(Node::Dir) => {
                let queue = nodes
                    .keys()
                    .filter(|candidate| candidate.parent() == Some(path))
                    .cloned()
                    .collect();
                Ok(Box::new(InMemReadDir { queue }))
            }
            Some(Node::File { .. }) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("read_dir on file: {}", path.display()),
            )),
            None => Err(Self::not_found("read_dir", path)),
        }
    }

    async fn metadata(&self, path: &Path) -> io::Result<FsMetadata> {
        match self.nodes.read().get(path) {
            Some(Node::Dir) => Ok(FsMetadata {
                is_dir: true,
                is_file: false,
                len: 0,
                modified: None,
            }),
            Some(Node::File { len, modified }) => Ok(FsMetadata {
                is_dir: false,
                is_file: true,
                len: *len,
                modified: Some(*modified),
            }),
            None => Err(Self::not_found("metadata", path)),
        }
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("remove_file on directory: {}", path.display()),
            )),
            None => Err(Self::not_found("remove_file", path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.write();
        let node = match nodes.get(from) {
            Some(node @ Node::File { .. }) => node.clone(),
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    format!("rename of directory: {}", from.display()),
                ));
            }
            None => return Err(Self::not_found("rename", from)),
        };
        nodes.remove(from);
        Self::ensure_parents(&mut nodes, to);
        nodes.insert(to.to_path_buf(), node);
        Ok(())
    }
}

struct InMemReadDir {
    queue: VecDeque<PathBuf>,
}

#[async_trait]
impl ReadDirStream for InMemReadDir {
    async fn next_entry(&mut self) -> io::Result<Option<PathBuf>> {
        Ok(self.queue.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_read_dir_lists_direct_children_only() {
        let fs = InMemoryFs::new();
        let now = SystemTime::now();
        fs.add_file("/in/a.csv", 3, now);
        fs.add_file("/in/nested/b.csv", 4, now);

        let mut entries = fs.read_dir(Path::new("/in")).await.unwrap();
        let mut seen = Vec::new();
        while let Some(path) = entries.next_entry().await.unwrap() {
            seen.push(path);
        }
        assert_eq!(
            seen,
            vec![PathBuf::from("/in/a.csv"), PathBuf::from("/in/nested")]
        );
    }

    #[tokio::test]
    async fn in_memory_rename_moves_file_into_new_directory() {
        let fs = InMemoryFs::new();
        fs.add_file("/in/a.csv", 3, SystemTime::now());

        fs.rename(Path::new("/in/a.csv"), Path::new("/done/a.csv"))
            .await
            .unwrap();

        assert!(!fs.contains(Path::new("/in/a.csv")));
        let md = fs.metadata(Path::new("/done/a.csv")).await.unwrap();
        assert!(md.is_file);
        assert_eq!(md.len, 3);
        assert!(fs.metadata(Path::new("/done")).await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn real_fs_reports_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, b"a,b\n").unwrap();

        let fs = RealFs::new();
        let md = fs.metadata(&path).await.unwrap();
        assert!(md.is_file);
        assert_eq!(md.len, 4);
        assert!(md.modified.is_some());

        let target = dir.path().join("archive").join("data.csv");
        fs.rename(&path, &target).await.unwrap();
        assert!(fs.path_exists(&target).await);
        assert!(!fs.path_exists(&path).await);
    }
}
