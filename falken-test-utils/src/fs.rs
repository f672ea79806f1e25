//! An in-memory [`FileSystem`], grounded in `falken-store`'s
//! [`LocalFileSystem`](falken_store::LocalFileSystem): same trait, same
//! path conventions, but backed by a `HashMap` so storage/monitor/processor
//! tests never touch disk.

use async_trait::async_trait;
use falken_store::{FileChangeEvent, FileSystem};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

struct Entry {
    data: Vec<u8>,
    modified_micros: i64,
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// A [`FileSystem`] backed entirely by process memory. Change notifications
/// fire synchronously from within `write_file`/`remove_file`, matching
/// `LocalFileSystem`'s own `notify`-driven callbacks closely enough that
/// `AssignmentMonitor`'s watcher task behaves the same against either.
pub struct InMemoryFileSystem {
    files: Mutex<HashMap<String, Entry>>,
    events_tx: broadcast::Sender<FileChangeEvent>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(1024);
        InMemoryFileSystem {
            files: Mutex::new(HashMap::new()),
            events_tx,
        }
    }
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn write_file(&self, path: &str, data: &[u8]) -> falken_store::Result<()> {
        self.files.lock().insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
                modified_micros: now_micros(),
            },
        );
        let _ = self.events_tx.send(FileChangeEvent { path: path.to_string() });
        Ok(())
    }

    async fn read_file(&self, path: &str) -> falken_store::Result<Vec<u8>> {
        self.files
            .lock()
            .get(path)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| falken_store::Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())))
    }

    async fn glob(&self, pattern: &str) -> falken_store::Result<Vec<String>> {
        let glob_pattern = glob::Pattern::new(pattern)
            .map_err(|e| falken_store::Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())))?;
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|path| glob_pattern.matches(path))
            .cloned()
            .collect())
    }

    async fn create_exclusive(&self, path: &str, data: &[u8]) -> falken_store::Result<bool> {
        let mut files = self.files.lock();
        if files.contains_key(path) {
            return Ok(false);
        }
        files.insert(
            path.to_string(),
            Entry {
                data: data.to_vec(),
                modified_micros: now_micros(),
            },
        );
        drop(files);
        let _ = self.events_tx.send(FileChangeEvent { path: path.to_string() });
        Ok(true)
    }

    async fn remove_file(&self, path: &str) -> falken_store::Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> falken_store::Result<bool> {
        Ok(self.files.lock().contains_key(path))
    }

    async fn modified_micros(&self, path: &str) -> falken_store::Result<i64> {
        self.files
            .lock()
            .get(path)
            .map(|entry| entry.modified_micros)
            .ok_or_else(|| falken_store::Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())))
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let fs = InMemoryFileSystem::new();
        fs.write_file("a/b/resource.1", b"hello").await.unwrap();
        assert_eq!(fs.read_file("a/b/resource.1").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn glob_matches_only_existing_files() {
        let fs = InMemoryFileSystem::new();
        fs.write_file("p/resource.1", b"x").await.unwrap();
        fs.write_file("p/resource.2", b"y").await.unwrap();
        fs.write_file("q/resource.1", b"z").await.unwrap();
        let mut matches = fs.glob("p/resource.*").await.unwrap();
        matches.sort();
        assert_eq!(matches, vec!["p/resource.1", "p/resource.2"]);
    }

    #[tokio::test]
    async fn create_exclusive_refuses_to_overwrite() {
        let fs = InMemoryFileSystem::new();
        assert!(fs.create_exclusive("lock", b"a").await.unwrap());
        assert!(!fs.create_exclusive("lock", b"b").await.unwrap());
        assert_eq!(fs.read_file("lock").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn remove_of_missing_file_is_a_no_op() {
        let fs = InMemoryFileSystem::new();
        fs.remove_file("never-existed").await.unwrap();
    }
}
