//! Distributed lock keyed by workflow id, with a TTL, acquired before a
//! read-modify-write `update` against the durable state store (§4.5).
//!
//! This in-process implementation is a building block the durable store
//! uses directly; a multi-coordinator deployment would back this with the
//! same key-value store the durable state lives in (`P:lock:<workflow_id>`,
//! §6), which is exactly the key this type's `lock_key` produces.

use orch_core::error::{OrchError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

struct LockState {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Clone)]
pub struct DistributedLock {
    locks: Arc<AsyncMutex<HashMap<String, LockState>>>,
    ttl: Duration,
    acquire_timeout: Duration,
}

/// Held while the lock is checked out; dropping it releases the lock as long
/// as it hasn't already expired and been stolen by another acquirer.
pub struct LockGuard {
    lock: DistributedLock,
    resource: String,
    token: Uuid,
}

impl DistributedLock {
    pub fn new(ttl: Duration, acquire_timeout: Duration) -> Self {
        Self {
            locks: Arc::new(AsyncMutex::new(HashMap::new())),
            ttl,
            acquire_timeout,
        }
    }

    pub fn lock_key(resource: &str) -> String {
        format!("P:lock:{resource}")
    }

    /// Attempt to acquire the lock for `resource`, polling until
    /// `acquire_timeout` elapses. Returns `Err(LockBusy)` on timeout, per
    /// §4.5's "the lock operation returns false on acquisition timeout".
    pub async fn acquire(&self, resource: &str) -> Result<LockGuard> {
        let deadline = Instant::now() + self.acquire_timeout;
        loop {
            {
                let mut guard = self.locks.lock().await;
                let now = Instant::now();
                let expired_or_absent = guard
                    .get(resource)
                    .map(|state| state.expires_at <= now)
                    .unwrap_or(true);

                if expired_or_absent {
                    let token = Uuid::new_v4();
                    guard.insert(
                        resource.to_string(),
                        LockState {
                            token,
                            expires_at: now + self.ttl,
                        },
                    );
                    debug!(resource, "lock acquired");
                    return Ok(LockGuard {
                        lock: self.clone(),
                        resource: resource.to_string(),
                        token,
                    });
                }
            }

            if Instant::now() >= deadline {
                warn!(resource, "lock acquisition timed out");
                return Err(OrchError::LockBusy {
                    resource: resource.to_string(),
                });
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn release(&self, resource: &str, token: Uuid) {
        let mut guard = self.locks.lock().await;
        if let Some(state) = guard.get(resource) {
            if state.token == token {
                guard.remove(resource);
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let lock = self.lock.clone();
        let resource = std::mem::take(&mut self.resource);
        let token = self.token;
        tokio::spawn(async move {
            lock.release(&resource, token).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquirer_times_out_while_held() {
        let lock = DistributedLock::new(Duration::from_secs(5), Duration::from_millis(50));
        let guard = lock.acquire("wf1").await.unwrap();

        let result = lock.acquire("wf1").await;
        assert!(matches!(result, Err(OrchError::LockBusy { .. })));
        drop(guard);
    }

    #[tokio::test]
    async fn lock_becomes_available_after_release() {
        let lock = DistributedLock::new(Duration::from_secs(5), Duration::from_millis(200));
        let guard = lock.acquire("wf1").await.unwrap();
        drop(guard);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(lock.acquire("wf1").await.is_ok());
    }

    #[tokio::test]
    async fn expired_lock_can_be_stolen() {
        let lock = DistributedLock::new(Duration::from_millis(20), Duration::from_millis(200));
        let _guard = lock.acquire("wf1").await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(lock.acquire("wf1").await.is_ok());
    }
}
