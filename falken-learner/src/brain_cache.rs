//! The process-wide brain cache (spec.md §9 "Global mutable state"),
//! grounded in `data_cache.py`'s `(hparam_json, brain_spec_digest)` keying.
//!
//! The original keeps a module-level singleton so repeated `Next()` calls
//! against the same assignment reuse an already-constructed trainer instead
//! of paying compile/warm-up cost every restart. Here it is an explicit
//! service the driver constructs once and threads through to every
//! processor, rather than a singleton reached via import.

use crate::brain::{Brain, BrainHandle, SharedBrain};
use crate::error::Result;
use async_trait::async_trait;
use falken_core::{BrainSpec, Hyperparameters};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Constructs a concrete [`Brain`] from a resolved brain spec and
/// hyperparameters. Implemented by the (out of scope) neural-network
/// trainer; `falken-test-utils` supplies a deterministic stand-in.
#[async_trait]
pub trait BrainFactory: Send + Sync {
    async fn create(&self, brain_spec: &BrainSpec, hparams: &Hyperparameters) -> Result<Box<dyn Brain>>;
}

fn cache_key(brain_spec: &BrainSpec, hparams: &Hyperparameters) -> Result<String> {
    let spec_digest = {
        let bytes = serde_json::to_vec(brain_spec)?;
        hex::encode(Sha256::digest(bytes))
    };
    let hparam_json = serde_json::to_string(hparams)?;
    Ok(format!("{hparam_json}\0{spec_digest}"))
}

/// A process-wide cache of constructed brains, keyed by `(hparam_json,
/// brain_spec_digest)` so two assignments that resolve to identical
/// hyperparameters and an identical brain spec share one trainer instance
/// (spec.md §9).
pub struct BrainCache {
    factory: Arc<dyn BrainFactory>,
    entries: AsyncMutex<HashMap<String, BrainHandle>>,
}

impl BrainCache {
    pub fn new(factory: Arc<dyn BrainFactory>) -> Self {
        BrainCache {
            factory,
            entries: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Returns the cached brain for `(brain_spec, hparams)`, constructing
    /// and caching a fresh one via the factory on a miss.
    pub async fn get_or_create(
        &self,
        brain_spec: &BrainSpec,
        hparams: Hyperparameters,
    ) -> Result<SharedBrain> {
        let key = cache_key(brain_spec, &hparams)?;
        let mut entries = self.entries.lock().await;
        if let Some(handle) = entries.get(&key) {
            return Ok(Arc::clone(&handle.brain));
        }

        let brain = self.factory.create(brain_spec, &hparams).await?;
        let handle = BrainHandle {
            brain: Arc::new(tokio::sync::Mutex::new(brain)),
            hparams,
        };
        let shared = Arc::clone(&handle.brain);
        entries.insert(key, handle);
        Ok(shared)
    }

    /// Drops the cached entry for `(brain_spec, hparams)`, forcing the next
    /// `get_or_create` to build a fresh brain. Used when a restart needs a
    /// brain reinitialized from scratch rather than reused.
    pub async fn invalidate(&self, brain_spec: &BrainSpec, hparams: &Hyperparameters) -> Result<()> {
        let key = cache_key(brain_spec, hparams)?;
        self.entries.lock().await.remove(&key);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
