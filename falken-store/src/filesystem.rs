//! The filesystem abstraction the resource store is built on (spec.md §4.1:
//! "a plain filesystem abstraction exposing `write_file(path, bytes)`,
//! `read_file(path) -> bytes`, `glob(pattern) -> [paths]`, and change
//! callbacks").

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A filesystem-level change, used by `AssignmentMonitor` (spec.md §4.2) to
/// learn about new assignments and chunks without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub path: String,
}

/// The storage primitives the resource store and assignment monitor need.
/// Implemented by [`LocalFileSystem`] for production use and by an
/// in-memory fake in `falken-test-utils` for deterministic tests.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Returns every path matching `pattern`, which may contain `*` but not
    /// `{a,b,c}` brace groups (those are expanded by the caller via
    /// [`falken_core::resource_id::expand_braces`] before reaching this
    /// trait).
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Creates `path` with `data` only if it does not already exist,
    /// atomically. Returns `false` without writing if the path already
    /// exists. Backs the assignment lease protocol (spec.md §4.2).
    async fn create_exclusive(&self, path: &str, data: &[u8]) -> Result<bool>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Last-modified time in microseconds since the epoch, used to detect
    /// stale lease sentinels (spec.md §4.2).
    async fn modified_micros(&self, path: &str) -> Result<i64>;

    /// Subscribes to filesystem change notifications under the store root.
    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent>;
}

/// A real, disk-backed [`FileSystem`] rooted at a directory, with change
/// notifications powered by `notify` (grounded in the recursive file
/// watching used elsewhere in the example pack for live-reloading assets).
pub struct LocalFileSystem {
    root: PathBuf,
    events_tx: broadcast::Sender<FileChangeEvent>,
    _watcher: notify::RecommendedWatcher,
}

impl LocalFileSystem {
    /// Creates the root directory if needed and starts watching it.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        use notify::{RecursiveMode, Watcher};

        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let (events_tx, _rx) = broadcast::channel(1024);
        let forward_tx = events_tx.clone();
        let watch_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let Ok(event) = event else { return };
            for path in event.paths {
                if let Ok(relative) = path.strip_prefix(&watch_root) {
                    let _ = forward_tx.send(FileChangeEvent {
                        path: relative.to_string_lossy().replace('\\', "/"),
                    });
                }
            }
        })
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        Ok(LocalFileSystem {
            root,
            events_tx,
            _watcher: watcher,
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, data).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let full_pattern = self.resolve(pattern).to_string_lossy().into_owned();
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut matches = Vec::new();
            for entry in glob::glob(&full_pattern)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?
            {
                let path = entry
                    .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
                if let Ok(relative) = path.strip_prefix(&root) {
                    matches.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
            Ok(matches)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    async fn create_exclusive(&self, path: &str, data: &[u8]) -> Result<bool> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
        {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                file.write_all(data).await?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn modified_micros(&self, path: &str) -> Result<i64> {
        let metadata = tokio::fs::metadata(self.resolve(path)).await?;
        let modified = metadata.modified()?;
        let micros = modified
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Ok(micros)
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.events_tx.subscribe()
    }
}

/// Shared handle alias used throughout the core: every component holds an
/// `Arc<dyn FileSystem>` rather than owning a concrete filesystem type.
pub type SharedFileSystem = Arc<dyn FileSystem>;
