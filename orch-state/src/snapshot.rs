//! Named, immutable workflow snapshots (§4.5 "Checkpoints"), stored under
//! `P:snapshot:<workflow_id>:<name>` alongside the versioned state.

use crate::durable::KvBackend;
use async_trait::async_trait;
use orch_core::error::{OrchError, Result};
use orch_core::traits::{CheckpointStore, StateStore};
use orch_core::types::Checkpoint;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const SNAPSHOT_PREFIX: &str = "P:snapshot";

fn snapshot_key(workflow_id: &str, name: &str) -> String {
    format!("{SNAPSHOT_PREFIX}:{workflow_id}:{name}")
}

fn snapshot_scan_prefix(workflow_id: &str) -> String {
    format!("{SNAPSHOT_PREFIX}:{workflow_id}:")
}

/// `CheckpointStore` built over any `StateStore` (to read the state being
/// captured) and any `KvBackend` (to persist the checkpoint itself).
pub struct SnapshotManager<S: StateStore, B: KvBackend> {
    state_store: Arc<S>,
    backend: B,
}

impl<S: StateStore, B: KvBackend> SnapshotManager<S, B> {
    pub fn new(state_store: Arc<S>, backend: B) -> Self {
        Self {
            state_store,
            backend,
        }
    }

    async fn read_checkpoint(&self, key: &str) -> Result<Option<Checkpoint>> {
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<S: StateStore, B: KvBackend> CheckpointStore for SnapshotManager<S, B> {
    async fn create(
        &self,
        workflow_id: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Checkpoint> {
        let latest = self
            .state_store
            .get_latest(workflow_id)
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("workflow {workflow_id} has no state")))?;

        let checkpoint = Checkpoint {
            name: name.to_string(),
            workflow_id: workflow_id.to_string(),
            version: latest.version,
            state: latest.state,
            metadata,
            created_at: chrono::Utc::now(),
        };

        self.backend
            .set(
                &snapshot_key(workflow_id, name),
                serde_json::to_string(&checkpoint)?,
                None,
            )
            .await?;

        info!(workflow_id, name, version = checkpoint.version, "checkpoint created");
        Ok(checkpoint)
    }

    async fn restore(&self, workflow_id: &str, name: &str) -> Result<Checkpoint> {
        let checkpoint = self
            .read_checkpoint(&snapshot_key(workflow_id, name))
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("checkpoint {workflow_id}/{name}")))?;

        // Restoring writes the captured state back at its captured version,
        // not as a new version — a restore is not itself a change.
        self.state_store
            .save(workflow_id, checkpoint.state.clone(), Some(checkpoint.version))
            .await?;

        info!(workflow_id, name, version = checkpoint.version, "checkpoint restored");
        Ok(checkpoint)
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<Checkpoint>> {
        let keys = self.backend.scan_prefix(&snapshot_scan_prefix(workflow_id)).await?;
        let mut checkpoints = Vec::new();
        for key in keys {
            if let Some(checkpoint) = self.read_checkpoint(&key).await? {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checkpoints)
    }

    async fn delete(&self, workflow_id: &str, name: &str) -> Result<()> {
        self.backend.delete(&snapshot_key(workflow_id, name)).await
    }

    async fn prune_keep_newest(&self, workflow_id: &str, keep: usize) -> Result<usize> {
        let checkpoints = self.list(workflow_id).await?;
        let to_delete = checkpoints.into_iter().skip(keep);
        let mut deleted = 0;
        for checkpoint in to_delete {
            self.delete(workflow_id, &checkpoint.name).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn prune_older_than(&self, workflow_id: &str, older_than_secs: i64) -> Result<usize> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(older_than_secs);
        let checkpoints = self.list(workflow_id).await?;
        let mut deleted = 0;
        for checkpoint in checkpoints.into_iter().filter(|c| c.created_at < cutoff) {
            self.delete(workflow_id, &checkpoint.name).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::DurableStateStore;
    use dashmap::DashMap;
    use orch_core::value::Map;
    use std::time::Duration;

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

    fn manager() -> SnapshotManager<DurableStateStore<MemKv>, MemKv> {
        let state_store = Arc::new(DurableStateStore::new(
            MemKv::new(),
            Duration::from_secs(5),
            Duration::from_secs(1),
        ));
        SnapshotManager::new(state_store, MemKv::new())
    }

    #[tokio::test]
    async fn create_and_restore_round_trip() {
        let mgr = manager();
        let mut state = Map::new();
        state.insert("a".to_string(), orch_core::Value::Number(1.0));
        mgr.state_store.save("wf1", state, None).await.unwrap();

        let checkpoint = mgr.create("wf1", "before-risky-step", HashMap::new()).await.unwrap();
        assert_eq!(checkpoint.version, 1);

        mgr.state_store
            .update("wf1", {
                let mut m = Map::new();
                m.insert("b".to_string(), orch_core::Value::Number(2.0));
                m
            })
            .await
            .unwrap();

        let restored = mgr.restore("wf1", "before-risky-step").await.unwrap();
        assert_eq!(restored.state.get("a"), Some(&orch_core::Value::Number(1.0)));
        assert!(restored.state.get("b").is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let mgr = manager();
        mgr.state_store.save("wf1", Map::new(), None).await.unwrap();
        mgr.create("wf1", "first", HashMap::new()).await.unwrap();
        mgr.create("wf1", "second", HashMap::new()).await.unwrap();

        let names: Vec<String> = mgr.list("wf1").await.unwrap().into_iter().map(|c| c.name).collect();
        assert!(names.contains(&"first".to_string()));
        assert!(names.contains(&"second".to_string()));
    }

    #[tokio::test]
    async fn prune_keep_newest_removes_older_checkpoints() {
        let mgr = manager();
        mgr.state_store.save("wf1", Map::new(), None).await.unwrap();
        for name in ["a", "b", "c"] {
            mgr.create("wf1", name, HashMap::new()).await.unwrap();
        }

        let deleted = mgr.prune_keep_newest("wf1", 1).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(mgr.list("wf1").await.unwrap().len(), 1);
    }
}
