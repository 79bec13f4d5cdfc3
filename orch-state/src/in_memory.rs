//! In-process state store: a single mutex serializes all mutating
//! operations, sufficient for single-process deployments (§4.5).

use async_trait::async_trait;
use orch_core::error::{OrchError, Result};
use orch_core::traits::StateStore;
use orch_core::types::StateVersion;
use orch_core::value::Map;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    versions: HashMap<String, Vec<StateVersion>>,
}

pub struct InMemoryStateStore {
    inner: Mutex<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, workflow_id: &str, state: Map, version: Option<u64>) -> Result<u64> {
        let mut guard = self.inner.lock().await;
        let versions = guard.versions.entry(workflow_id.to_string()).or_default();

        let next_version = match version {
            Some(explicit) => explicit,
            None => versions.last().map(|v| v.version + 1).unwrap_or(1),
        };

        let record = StateVersion {
            workflow_id: workflow_id.to_string(),
            version: next_version,
            state,
            created_at: chrono::Utc::now(),
        };

        // Snapshot restore may rewrite an existing version in place; a fresh
        // save always appends.
        if let Some(slot) = versions.iter_mut().find(|v| v.version == next_version) {
            *slot = record;
        } else {
            versions.push(record);
            versions.sort_by_key(|v| v.version);
        }

        Ok(next_version)
    }

    async fn get(&self, workflow_id: &str, version: u64) -> Result<Option<StateVersion>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .versions
            .get(workflow_id)
            .and_then(|versions| versions.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn get_latest(&self, workflow_id: &str) -> Result<Option<StateVersion>> {
        let guard = self.inner.lock().await;
        Ok(guard
            .versions
            .get(workflow_id)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn update(&self, workflow_id: &str, patch: Map) -> Result<u64> {
        let mut guard = self.inner.lock().await;
        let versions = guard.versions.entry(workflow_id.to_string()).or_default();

        let mut merged = versions
            .last()
            .map(|v| v.state.clone())
            .unwrap_or_default();
        for (key, value) in patch {
            merged.insert(key, value);
        }

        let next_version = versions.last().map(|v| v.version + 1).unwrap_or(1);
        versions.push(StateVersion {
            workflow_id: workflow_id.to_string(),
            version: next_version,
            state: merged,
            created_at: chrono::Utc::now(),
        });

        Ok(next_version)
    }

    async fn history(&self, workflow_id: &str) -> Result<Vec<StateVersion>> {
        let guard = self.inner.lock().await;
        Ok(guard.versions.get(workflow_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, workflow_id: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.versions.remove(workflow_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let guard = self.inner.lock().await;
        Ok(guard.versions.keys().cloned().collect())
    }
}

#[allow(dead_code)]
fn _not_found(workflow_id: &str) -> OrchError {
    OrchError::NotFound(format!("workflow {workflow_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn versions_are_contiguous_and_monotonic() {
        let store = InMemoryStateStore::new();
        let v1 = store.save("wf1", Map::new(), None).await.unwrap();
        let v2 = store.save("wf1", Map::new(), None).await.unwrap();
        let v3 = store.save("wf1", Map::new(), None).await.unwrap();
        assert_eq!((v1, v2, v3), (1, 2, 3));

        for v in 1..=3 {
            assert!(store.get("wf1", v).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn update_merges_with_latest() {
        let store = InMemoryStateStore::new();
        let mut first = Map::new();
        first.insert("a".to_string(), orch_core::Value::Number(1.0));
        store.save("wf1", first, None).await.unwrap();

        let mut patch = Map::new();
        patch.insert("b".to_string(), orch_core::Value::Number(2.0));
        store.update("wf1", patch).await.unwrap();

        let latest = store.get_latest("wf1").await.unwrap().unwrap();
        assert_eq!(latest.state.get("a"), Some(&orch_core::Value::Number(1.0)));
        assert_eq!(latest.state.get("b"), Some(&orch_core::Value::Number(2.0)));
    }

    #[tokio::test]
    async fn concurrent_updates_each_get_a_new_version() {
        let store = Arc::new(InMemoryStateStore::new());
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
        let mut versions: Vec<u64> = history.iter().map(|v| v.version).collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=10).collect::<Vec<_>>());
    }
}
