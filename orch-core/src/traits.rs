//! Core traits defining the seams between orchestrator components.

use crate::error::Result;
use crate::types::{Checkpoint, StateVersion};
use crate::value::{Map, Value};
use async_trait::async_trait;
use std::collections::HashMap;

/// A report from an agent's health probe, consumed by the Selector's health
/// sub-score (§4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthReport {
    pub healthy: bool,
    pub success_rate: f64,
    pub latency_ms: f64,
}

impl HealthReport {
    pub fn healthy(success_rate: f64, latency_ms: f64) -> Self {
        Self {
            healthy: true,
            success_rate,
            latency_ms,
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            success_rate: 0.0,
            latency_ms: f64::MAX,
        }
    }
}

/// The invocation surface agents present to the Executor. Mixed sync/async
/// agent implementations (per Design Notes) standardize on this async
/// interface; synchronous adapters wrap blocking calls on a worker pool via
/// `tokio::task::spawn_blocking` rather than exposing a second trait.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    async fn invoke(&self, input: Value) -> Result<Value>;

    /// Default: always healthy. Agents with a cheaper or more accurate probe
    /// override this.
    async fn health_check(&self) -> HealthReport {
        HealthReport::healthy(1.0, 0.0)
    }
}

/// Versioned per-workflow state with optimistic-lock-protected updates
/// (§4.5). Both the in-process and durable implementations in `orch-state`
/// satisfy this trait identically from the caller's point of view.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save `state` as a new version (or as the given explicit version, used
    /// by checkpoint restore). Returns the version that was written.
    async fn save(&self, workflow_id: &str, state: Map, version: Option<u64>) -> Result<u64>;

    async fn get(&self, workflow_id: &str, version: u64) -> Result<Option<StateVersion>>;

    async fn get_latest(&self, workflow_id: &str) -> Result<Option<StateVersion>>;

    /// Atomically merge `patch` into the latest state and save the result as
    /// a new version, even under concurrent callers.
    async fn update(&self, workflow_id: &str, patch: Map) -> Result<u64>;

    async fn history(&self, workflow_id: &str) -> Result<Vec<StateVersion>>;

    async fn delete(&self, workflow_id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<String>>;
}

/// Named, immutable snapshots of a workflow's state at a given version.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn create(
        &self,
        workflow_id: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Checkpoint>;

    /// Write the checkpoint's captured state back to the store at its
    /// captured version (not as a new version).
    async fn restore(&self, workflow_id: &str, name: &str) -> Result<Checkpoint>;

    /// Newest-first.
    async fn list(&self, workflow_id: &str) -> Result<Vec<Checkpoint>>;

    async fn delete(&self, workflow_id: &str, name: &str) -> Result<()>;

    /// Keep only the `keep` most recent checkpoints for a workflow.
    async fn prune_keep_newest(&self, workflow_id: &str, keep: usize) -> Result<usize>;

    /// Delete checkpoints older than `older_than_secs` seconds.
    async fn prune_older_than(&self, workflow_id: &str, older_than_secs: i64) -> Result<usize>;
}
