//! The advisory filesystem lease protocol (spec.md §4.2 "Lease protocol").
//!
//! A lease is a sentinel file `{assignment_rid}/lock.{owner_uuid}` created
//! with create-exclusive semantics. Exactly one concurrent
//! `acquire_assignment` call wins per assignment; the winner releases by
//! deleting its own sentinel. Sentinels older than `stale_after` are swept
//! by [`LeaseManager::reclaim_stale_leases`] so a crashed holder's
//! assignment becomes acquirable again.

use crate::error::Result;
use falken_core::timestamp::now_micros;
use falken_core::ResourceId;
use falken_store::SharedFileSystem;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

const LOCK_PREFIX: &str = "lock.";

fn lock_glob(assignment_rid: &ResourceId) -> String {
    format!("{}/{LOCK_PREFIX}*", assignment_rid.path())
}

fn lock_path(assignment_rid: &ResourceId, owner: Uuid) -> String {
    format!("{}/{LOCK_PREFIX}{owner}", assignment_rid.path())
}

/// Owns this process's identity and the set of assignments it currently
/// holds a lease on.
pub struct LeaseManager {
    fs: SharedFileSystem,
    owner: Uuid,
    stale_after_micros: i64,
    held: Mutex<HashMap<String, String>>,
}

impl LeaseManager {
    pub fn new(fs: SharedFileSystem, stale_after_seconds: i64) -> Self {
        LeaseManager {
            fs,
            owner: Uuid::new_v4(),
            stale_after_micros: stale_after_seconds * 1_000_000,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner
    }

    /// Whether this process currently holds the lease on `assignment_rid`.
    pub fn is_held_by_self(&self, assignment_rid: &ResourceId) -> bool {
        self.held.lock().unwrap().contains_key(assignment_rid.path())
    }

    /// Removes sentinel files older than the staleness bound, regardless of
    /// owner, so a crashed holder's lease is eventually reclaimable.
    pub async fn reclaim_stale_leases(&self, assignment_rid: &ResourceId) -> Result<()> {
        let now = now_micros();
        for path in self.fs.glob(&lock_glob(assignment_rid)).await? {
            let modified = self.fs.modified_micros(&path).await?;
            if now.saturating_sub(modified) > self.stale_after_micros {
                self.fs.remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Attempts to acquire the lease on `assignment_rid`. Idempotent when
    /// already held by this process; otherwise fails (`Ok(false)`) while any
    /// other sentinel remains after stale reclamation. Also fails if this
    /// process already holds a lease on a *different* assignment: spec.md
    /// §4.2 "Concurrency" allows at most one active acquisition per process,
    /// so a second live acquisition must fail rather than accumulate.
    pub async fn acquire(&self, assignment_rid: &ResourceId) -> Result<bool> {
        if self.is_held_by_self(assignment_rid) {
            return Ok(true);
        }
        if self
            .held
            .lock()
            .unwrap()
            .keys()
            .any(|held_rid| held_rid != assignment_rid.path())
        {
            return Ok(false);
        }

        self.reclaim_stale_leases(assignment_rid).await?;
        if !self.fs.glob(&lock_glob(assignment_rid)).await?.is_empty() {
            return Ok(false);
        }

        let path = lock_path(assignment_rid, self.owner);
        let created = self
            .fs
            .create_exclusive(&path, self.owner.to_string().as_bytes())
            .await?;
        if created {
            self.held
                .lock()
                .unwrap()
                .insert(assignment_rid.path().to_string(), path);
        }
        Ok(created)
    }

    /// Releases a lease held by this process. Idempotent: releasing an
    /// assignment this process does not hold is a no-op.
    pub async fn release(&self, assignment_rid: &ResourceId) -> Result<()> {
        let path = self.held.lock().unwrap().remove(assignment_rid.path());
        if let Some(path) = path {
            self.fs.remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use falken_store::LocalFileSystem;
    use std::sync::Arc;
    use std::time::Duration;

    fn fs(dir: &std::path::Path) -> SharedFileSystem {
        Arc::new(LocalFileSystem::new(dir).unwrap())
    }

    #[tokio::test]
    async fn second_acquire_from_a_different_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let a = LeaseManager::new(fs(dir.path()), 600);
        let b = LeaseManager::new(fs(dir.path()), 600);
        let rid = ResourceId::assignment("p", "b", "s", "default");

        assert!(a.acquire(&rid).await.unwrap());
        assert!(!b.acquire(&rid).await.unwrap());
    }

    #[tokio::test]
    async fn a_second_assignment_cannot_be_acquired_while_the_first_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let a = LeaseManager::new(fs(dir.path()), 600);
        let first = ResourceId::assignment("p", "b", "s", "default");
        let second = ResourceId::assignment("p", "b", "s2", "default");

        assert!(a.acquire(&first).await.unwrap());
        assert!(!a.acquire(&second).await.unwrap());

        a.release(&first).await.unwrap();
        assert!(a.acquire(&second).await.unwrap());
    }

    #[tokio::test]
    async fn repeated_acquire_by_the_same_holder_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let a = LeaseManager::new(fs(dir.path()), 600);
        let rid = ResourceId::assignment("p", "b", "s", "default");

        assert!(a.acquire(&rid).await.unwrap());
        assert!(a.acquire(&rid).await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_frees_the_lease() {
        let dir = tempfile::tempdir().unwrap();
        let a = LeaseManager::new(fs(dir.path()), 600);
        let b = LeaseManager::new(fs(dir.path()), 600);
        let rid = ResourceId::assignment("p", "b", "s", "default");

        assert!(a.acquire(&rid).await.unwrap());
        a.release(&rid).await.unwrap();
        a.release(&rid).await.unwrap();
        assert!(b.acquire(&rid).await.unwrap());
    }

    #[tokio::test]
    async fn stale_lease_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let a = LeaseManager::new(fs(dir.path()), 0);
        let b = LeaseManager::new(fs(dir.path()), 0);
        let rid = ResourceId::assignment("p", "b", "s", "default");

        assert!(a.acquire(&rid).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(b.acquire(&rid).await.unwrap());
    }
}
