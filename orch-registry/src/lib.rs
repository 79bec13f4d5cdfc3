//! In-memory agent catalog: a capability index over `AgentRecord`s plus the
//! live workload counters the Selector's load sub-score reads.
//!
//! Read-mostly and process-wide (§5): registration/deregistration take the
//! `DashMap`'s per-shard write lock, lookups and scoring reads never block
//! each other.

use dashmap::DashMap;
use orch_core::error::{OrchError, Result};
use orch_core::types::{AgentRecord, AgentStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Live workload for one agent: an atomic counter bracketing invocations,
/// incremented before dispatch and decremented on every exit path (Design
/// Notes "Per-task workload counter").
#[derive(Default)]
pub struct Workload(AtomicU32);

impl Workload {
    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        // Saturating: a decrement racing a concurrent reset should never
        // wrap past zero.
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_sub(1))
            });
    }
}

#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, AgentRecord>>,
    workloads: Arc<DashMap<String, Arc<Workload>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            workloads: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, record: AgentRecord) {
        info!(agent_id = %record.agent_id, "registering agent");
        self.workloads
            .entry(record.agent_id.clone())
            .or_insert_with(|| Arc::new(Workload::default()));
        self.agents.insert(record.agent_id.clone(), record);
    }

    pub fn deregister(&self, agent_id: &str) {
        self.agents.remove(agent_id);
        self.workloads.remove(agent_id);
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.get(agent_id).map(|r| r.clone())
    }

    pub fn exists(&self, agent_id: &str) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn all(&self) -> Vec<AgentRecord> {
        self.agents.iter().map(|r| r.clone()).collect()
    }

    pub fn active(&self) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|r| r.status == AgentStatus::Active)
            .map(|r| r.clone())
            .collect()
    }

    /// All active agents advertising a given capability tag.
    pub fn active_with_capability(&self, capability: &str) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|r| r.status == AgentStatus::Active && r.has_capability(capability))
            .map(|r| r.clone())
            .collect()
    }

    pub fn workload_of(&self, agent_id: &str) -> u32 {
        self.workloads
            .get(agent_id)
            .map(|w| w.current())
            .unwrap_or(0)
    }

    pub fn increment_workload(&self, agent_id: &str) {
        let workload = self
            .workloads
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Workload::default()));
        workload.increment();
        debug!(agent_id, "incremented workload");
    }

    pub fn decrement_workload(&self, agent_id: &str) {
        if let Some(workload) = self.workloads.get(agent_id) {
            workload.decrement();
            debug!(agent_id, "decremented workload");
        }
    }

    pub fn set_heartbeat_now(&self, agent_id: &str) -> Result<()> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| OrchError::NotFound(format!("agent {agent_id}")))?;
        entry.last_heartbeat = chrono::Utc::now();
        Ok(())
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII-style workload guard: increments on creation, decrements on drop, so
/// the Executor's bracketing decrement fires on every exit path including a
/// panic unwind.
pub struct WorkloadGuard {
    registry: AgentRegistry,
    agent_id: String,
}

impl WorkloadGuard {
    pub fn enter(registry: &AgentRegistry, agent_id: &str) -> Self {
        registry.increment_workload(agent_id);
        Self {
            registry: registry.clone(),
            agent_id: agent_id.to_string(),
        }
    }
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        self.registry.decrement_workload(&self.agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> AgentRecord {
        AgentRecord::new(id, id).with_capabilities(["generic"])
    }

    #[test]
    fn workload_guard_decrements_on_drop() {
        let registry = AgentRegistry::new();
        registry.register(agent("a1"));
        {
            let _guard = WorkloadGuard::enter(&registry, "a1");
            assert_eq!(registry.workload_of("a1"), 1);
        }
        assert_eq!(registry.workload_of("a1"), 0);
    }

    #[test]
    fn active_with_capability_filters_inactive() {
        let registry = AgentRegistry::new();
        let mut inactive = agent("a2");
        inactive.status = AgentStatus::Inactive;
        registry.register(agent("a1"));
        registry.register(inactive);

        let found = registry.active_with_capability("generic");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_id, "a1");
    }
}
