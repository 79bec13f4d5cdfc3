//! Durable state store layered over a key-value backend, implementing the
//! `P:<workflow_id>:...` key layout (§6) with a distributed lock guarding
//! read-modify-write `update` calls (§4.5).

use crate::locks::DistributedLock;
use async_trait::async_trait;
use orch_core::error::{OrchError, Result};
use orch_core::traits::StateStore;
use orch_core::types::StateVersion;
use orch_core::value::Map;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Abstracts the key-value store spec.md leaves unspecified. A single key
/// maps to a single opaque blob; `scan_prefix` supports the metadata-key
/// enumeration `list()` needs.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Metadata {
    current_version: u64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

const PREFIX: &str = "P";

pub struct DurableStateStore<B: KvBackend> {
    backend: B,
    lock: DistributedLock,
}

impl<B: KvBackend> DurableStateStore<B> {
    pub fn new(backend: B, lock_ttl: Duration, lock_acquire_timeout: Duration) -> Self {
        Self {
            backend,
            lock: DistributedLock::new(lock_ttl, lock_acquire_timeout),
        }
    }

    fn metadata_key(workflow_id: &str) -> String {
        format!("{PREFIX}:{workflow_id}:metadata")
    }

    fn version_key(workflow_id: &str, version: u64) -> String {
        format!("{PREFIX}:{workflow_id}:v{version}")
    }

    async fn read_metadata(&self, workflow_id: &str) -> Result<Option<Metadata>> {
        match self.backend.get(&Self::metadata_key(workflow_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn read_version(&self, workflow_id: &str, version: u64) -> Result<Option<StateVersion>> {
        match self
            .backend
            .get(&Self::version_key(workflow_id, version))
            .await?
        {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// `save` with an explicit TTL on both the version key and the metadata
    /// key, so they expire together (§4.5 "TTL").
    #[instrument(skip(self, state))]
    pub async fn save_with_ttl(
        &self,
        workflow_id: &str,
        state: Map,
        version: Option<u64>,
        ttl: Option<Duration>,
    ) -> Result<u64> {
        let existing_meta = self.read_metadata(workflow_id).await?;
        let next_version = version.unwrap_or_else(|| {
            existing_meta.as_ref().map(|m| m.current_version + 1).unwrap_or(1)
        });
        let now = chrono::Utc::now();

        let record = StateVersion {
            workflow_id: workflow_id.to_string(),
            version: next_version,
            state,
            created_at: now,
        };
        self.backend
            .set(
                &Self::version_key(workflow_id, next_version),
                serde_json::to_string(&record)?,
                ttl,
            )
            .await?;

        let metadata = Metadata {
            current_version: next_version,
            created_at: existing_meta.map(|m| m.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.backend
            .set(&Self::metadata_key(workflow_id), serde_json::to_string(&metadata)?, ttl)
            .await?;

        debug!(workflow_id, version = next_version, "saved state version");
        Ok(next_version)
    }
}

#[async_trait]
impl<B: KvBackend> StateStore for DurableStateStore<B> {
    async fn save(&self, workflow_id: &str, state: Map, version: Option<u64>) -> Result<u64> {
        self.save_with_ttl(workflow_id, state, version, None).await
    }

    async fn get(&self, workflow_id: &str, version: u64) -> Result<Option<StateVersion>> {
        self.read_version(workflow_id, version).await
    }

    async fn get_latest(&self, workflow_id: &str) -> Result<Option<StateVersion>> {
        let Some(metadata) = self.read_metadata(workflow_id).await? else {
            return Ok(None);
        };
        self.read_version(workflow_id, metadata.current_version).await
    }

    async fn update(&self, workflow_id: &str, patch: Map) -> Result<u64> {
        let _guard = self.lock.acquire(workflow_id).await?;

        let mut merged = self
            .get_latest(workflow_id)
            .await?
            .map(|v| v.state)
            .unwrap_or_default();
        for (key, value) in patch {
            merged.insert(key, value);
        }

        self.save(workflow_id, merged, None).await
    }

    async fn history(&self, workflow_id: &str) -> Result<Vec<StateVersion>> {
        let Some(metadata) = self.read_metadata(workflow_id).await? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        // History queries must tolerate missing older versions (expired TTL).
        for version in 1..=metadata.current_version {
            if let Some(record) = self.read_version(workflow_id, version).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn delete(&self, workflow_id: &str) -> Result<()> {
        let metadata = self.read_metadata(workflow_id).await?;
        if let Some(metadata) = metadata {
            for version in 1..=metadata.current_version {
                self.backend.delete(&Self::version_key(workflow_id, version)).await?;
            }
        }
        self.backend.delete(&Self::metadata_key(workflow_id)).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let keys = self.backend.scan_prefix(&format!("{PREFIX}:")).await?;
        let mut ids: Vec<String> = keys
            .into_iter()
            .filter_map(|k| {
                let rest = k.strip_prefix(&format!("{PREFIX}:"))?;
                let workflow_id = rest.strip_suffix(":metadata")?;
                Some(workflow_id.to_string())
            })
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// A `sqlx`-backed `KvBackend`: one row per key in a single table, TTL
/// enforced by an `expires_at` column checked on read.
pub struct SqliteKvBackend {
    pool: sqlx::SqlitePool,
}

impl SqliteKvBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(url)
            .await
            .map_err(|e| OrchError::StorePersist(format!("sqlite connect failed: {e}")))?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orch_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| OrchError::StorePersist(format!("sqlite migration failed: {e}")))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl KvBackend for SqliteKvBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM orch_kv WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| OrchError::StorePersist(e.to_string()))?;

        match row {
            Some((_, Some(expires_at))) if expires_at < chrono::Utc::now().timestamp() => {
                self.delete(key).await?;
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| chrono::Utc::now().timestamp() + d.as_secs() as i64);
        sqlx::query(
            "INSERT INTO orch_kv (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchError::StorePersist(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM orch_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| OrchError::StorePersist(e.to_string()))?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM orch_kv WHERE key LIKE ?")
                .bind(format!("{prefix}%"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| OrchError::StorePersist(e.to_string()))?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// An in-memory `KvBackend` for exercising `DurableStateStore`'s key
    /// layout and locking without a real database.
    struct MemKv {
        map: Arc<DashMap<String, String>>,
    }

    impl MemKv {
        fn new() -> Self {
            Self {
                map: Arc::new(DashMap::new()),
            }
        }
    }

    #[async_trait]
    impl KvBackend for MemKv {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.map.get(key).map(|v| v.clone()))
        }

        async fn set(&self, key: &str, value: String, _ttl: Option<Duration>) -> Result<()> {
            self.map.insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.map.remove(key);
            Ok(())
        }

        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .map
                .iter()
                .map(|e| e.key().clone())
                .filter(|k| k.starts_with(prefix))
                .collect())
        }
    }

    fn store() -> DurableStateStore<MemKv> {
        DurableStateStore::new(MemKv::new(), Duration::from_secs(5), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn versions_are_monotonic_and_readable_in_range() {
        let store = store();
        let v1 = store.save("wf1", Map::new(), None).await.unwrap();
        let v2 = store.save("wf1", Map::new(), None).await.unwrap();
        assert_eq!((v1, v2), (1, 2));
        assert!(store.get("wf1", 1).await.unwrap().is_some());
        assert!(store.get("wf1", 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_is_atomic_under_lock() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..10u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut patch = Map::new();
                patch.insert(format!("k{i}"), orch_core::Value::Number(i as f64));
                store.update("wf-concurrent", patch).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let history = store.history("wf-concurrent").await.unwrap();
        assert_eq!(history.len(), 10);
    }

    #[tokio::test]
    async fn list_returns_known_workflow_ids() {
        let store = store();
        store.save("wf1", Map::new(), None).await.unwrap();
        store.save("wf2", Map::new(), None).await.unwrap();
        let mut ids = store.list().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["wf1".to_string(), "wf2".to_string()]);
    }
}
