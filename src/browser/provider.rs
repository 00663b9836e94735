//! Where engine processes come from.
//!
//! [`SpawnPerRequest`] launches a fresh process for every session and tears it
//! down afterwards. [`PooledProvider`] keeps up to `size` processes alive and
//! hands them out one session at a time.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::{Engine, EngineProcess};
use crate::{RenderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    #[default]
    Spawn,
    Pooled,
}

/// Supplies engine processes to sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn mode(&self) -> ProviderMode;

    /// Obtain exclusive use of one engine process.
    async fn checkout(&self) -> Result<EngineLease>;

    /// Stop handing out processes and release idle ones.
    async fn shutdown(&self) {}
}

/// Exclusive use of one engine process, returned through [`EngineLease::release`].
pub struct EngineLease {
    process: Box<dyn EngineProcess>,
    slot: Option<PoolSlot>,
}

struct PoolSlot {
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl EngineLease {
    fn owned(process: Box<dyn EngineProcess>) -> Self {
        Self {
            process,
            slot: None,
        }
    }

    pub fn process(&mut self) -> &mut dyn EngineProcess {
        self.process.as_mut()
    }

    /// Give the process back. Unhealthy or unpooled processes are shut down;
    /// failures are logged, never returned.
    pub async fn release(self, healthy: bool) {
        let EngineLease { mut process, slot } = self;
        match slot {
            Some(slot) if healthy && !slot.pool.permits.is_closed() => {
                slot.pool.idle.lock().await.push(process);
                debug!("engine process returned to pool");
            }
            _ => {
                if let Err(err) = process.shutdown().await {
                    warn!(error = %err, "engine shutdown failed");
                }
            }
        }
    }
}

/// One engine process per session, no reuse.
pub struct SpawnPerRequest {
    engine: Arc<dyn Engine>,
}

impl SpawnPerRequest {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl SessionProvider for SpawnPerRequest {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Spawn
    }

    async fn checkout(&self) -> Result<EngineLease> {
        let process = self.engine.launch().await?;
        Ok(EngineLease::owned(process))
    }
}

struct PoolInner {
    idle: Mutex<Vec<Box<dyn EngineProcess>>>,
    permits: Arc<Semaphore>,
}

/// At most `size` engine processes, reused across sessions.
///
/// Checkout waits for a free slot. A process that errored during a session is
/// discarded instead of returned.
pub struct PooledProvider {
    engine: Arc<dyn Engine>,
    inner: Arc<PoolInner>,
}

impl PooledProvider {
    pub fn new(engine: Arc<dyn Engine>, size: usize) -> Self {
        Self {
            engine,
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(size.max(1))),
            }),
        }
    }
}

#[async_trait]
impl SessionProvider for PooledProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Pooled
    }

    async fn checkout(&self) -> Result<EngineLease> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::InvalidState("engine pool is shut down".to_string()))?;

        let reused = self.inner.idle.lock().await.pop();
        let process = match reused {
            Some(process) => {
                debug!("reusing pooled engine process");
                process
            }
            None => self.engine.launch().await?,
        };

        Ok(EngineLease {
            process,
            slot: Some(PoolSlot {
                pool: self.inner.clone(),
                _permit: permit,
            }),
        })
    }

    async fn shutdown(&self) {
        self.inner.permits.close();
        let drained: Vec<_> = self.inner.idle.lock().await.drain(..).collect();
        for mut process in drained {
            if let Err(err) = process.shutdown().await {
                warn!(error = %err, "pooled engine shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    #[tokio::test]
    async fn spawn_provider_shuts_down_on_release() {
        let engine = FakeEngine::new();
        let provider = SpawnPerRequest::new(Arc::new(engine.clone()));

        let lease = provider.checkout().await.unwrap();
        lease.release(true).await;

        assert_eq!(engine.stats().launched(), 1);
        assert_eq!(engine.stats().shut_down(), 1);
    }

    #[tokio::test]
    async fn pool_reuses_healthy_processes() {
        let engine = FakeEngine::new();
        let provider = PooledProvider::new(Arc::new(engine.clone()), 2);

        let lease = provider.checkout().await.unwrap();
        lease.release(true).await;
        assert_eq!(engine.stats().shut_down(), 0);

        let lease = provider.checkout().await.unwrap();
        lease.release(true).await;

        assert_eq!(engine.stats().launched(), 1);
        assert_eq!(engine.stats().shut_down(), 0);
    }

    #[tokio::test]
    async fn pool_discards_unhealthy_processes() {
        let engine = FakeEngine::new();
        let provider = PooledProvider::new(Arc::new(engine.clone()), 1);

        let lease = provider.checkout().await.unwrap();
        lease.release(false).await;
        assert_eq!(engine.stats().shut_down(), 1);

        let lease = provider.checkout().await.unwrap();
        lease.release(true).await;
        assert_eq!(engine.stats().launched(), 2);
    }

    #[tokio::test]
    async fn pool_bounds_concurrent_checkouts() {
        let engine = FakeEngine::new();
        let provider = Arc::new(PooledProvider::new(Arc::new(engine.clone()), 1));

        let first = provider.checkout().await.unwrap();
        let waiting = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.checkout().await.map(|_| ()) })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        first.release(true).await;
        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn pool_shutdown_drains_idle_and_rejects_checkout() {
        let engine = FakeEngine::new();
        let provider = PooledProvider::new(Arc::new(engine.clone()), 2);

        let a = provider.checkout().await.unwrap();
        let b = provider.checkout().await.unwrap();
        a.release(true).await;
        provider.shutdown().await;
        // Returned after shutdown: must not be parked.
        b.release(true).await;

        assert_eq!(engine.stats().shut_down(), 2);
        assert!(provider.checkout().await.is_err());
    }

    #[tokio::test]
    async fn zero_sized_pool_still_hands_out_one_process() {
        let provider = PooledProvider::new(Arc::new(FakeEngine::new()), 0);
        assert_eq!(provider.mode(), ProviderMode::Pooled);

        let lease = tokio::time::timeout(std::time::Duration::from_secs(1), provider.checkout())
            .await
            .expect("checkout must not wait on an empty pool")
            .unwrap();
        lease.release(true).await;
    }
}
