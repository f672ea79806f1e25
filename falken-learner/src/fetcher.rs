//! Background data fetching for the training loop (spec.md §4.4.4),
//! grounded in `assignment_processor.py`'s `_fetch_data`/`_chunk_generator`.
//!
//! The original runs the store query on a dedicated thread so the main
//! training loop never blocks on I/O; here that becomes a `tokio::spawn`ed
//! task that polls the storage façade and forwards fresh batches over a
//! channel, matching the "push events to a bounded channel" substitute for
//! Python generators used elsewhere in this workspace.

use crate::storage::Storage;
use falken_core::EpisodeChunk;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 16;

/// Polls `GetEpisodeChunks` across a session and its ancestors, deduping by
/// `(session_id, episode_id, chunk_id)` so an assignment that restarts
/// against the same data never double-counts a chunk (spec.md §4.4.4
/// "Duplicate suppression").
pub struct DataFetcher {
    rx: mpsc::Receiver<Vec<EpisodeChunk>>,
    worker: JoinHandle<()>,
    queries_completed: Arc<AtomicU64>,
}

impl DataFetcher {
    pub fn spawn(
        storage: Arc<Storage>,
        project: String,
        brain: String,
        session: String,
        ancestor_sessions: HashSet<String>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let queries_completed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&queries_completed);

        let worker = tokio::spawn(async move {
            let mut sessions: Vec<String> = ancestor_sessions.into_iter().collect();
            sessions.push(session);
            let mut seen: HashSet<(String, String, u32)> = HashSet::new();

            loop {
                match storage.get_episode_chunks(&project, &brain, &sessions).await {
                    Ok(chunks) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let fresh: Vec<EpisodeChunk> = chunks
                            .into_iter()
                            .filter(|chunk| {
                                seen.insert((
                                    chunk.session_id.clone(),
                                    chunk.episode_id.clone(),
                                    chunk.chunk_id,
                                ))
                            })
                            .collect();
                        if !fresh.is_empty() && tx.send(fresh).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "data fetcher query failed");
                    }
                }
                tokio::time::sleep(poll_interval).await;
            }
        });

        DataFetcher {
            rx,
            worker,
            queries_completed,
        }
    }

    /// Waits for the next fresh batch. `Some(timeout)` bounds the wait (used
    /// for the first call, per spec.md §4.4.4); `None` returns immediately
    /// with whatever is already queued.
    pub async fn fetch(&mut self, timeout: Option<Duration>) -> Option<Vec<EpisodeChunk>> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten(),
            None => self.rx.try_recv().ok(),
        }
    }

    /// Number of store queries that have completed so far, used to
    /// distinguish "queried but found nothing" from "never managed to
    /// query at all" (spec.md §4.4.4 `NoData`).
    pub fn queries_completed(&self) -> u64 {
        self.queries_completed.load(Ordering::Relaxed)
    }
}

impl Drop for DataFetcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
