//! Composition-root agent catalog: the `Arc<dyn Agent>` instances backing
//! the registry's metadata records, plus the `AgentInvoker`/`HealthSource`
//! adapters the executor and selector crates are built against (Design
//! Notes "Mixed sync/async agent surfaces" and "Global singletons").

use async_trait::async_trait;
use dashmap::DashMap;
use orch_core::error::{OrchError, Result};
use orch_core::traits::{Agent, HealthReport};
use orch_core::value::Value;
use orch_executor::AgentInvoker;
use orch_selector::HealthSource;
use std::sync::Arc;

/// Keyed by agent id, mirrors `AgentRegistry`'s metadata map but holds the
/// actual invocable instances rather than descriptive records.
#[derive(Clone, Default)]
pub struct AgentCatalog {
    agents: Arc<DashMap<String, Arc<dyn Agent>>>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentInvoker for AgentCatalog {
    async fn invoke(&self, agent_id: &str, input: Value) -> Result<Value> {
        let agent = self
            .agents
            .get(agent_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| OrchError::invocation(agent_id, format!("agent '{agent_id}' is not registered in this process")))?;
        agent.invoke(input).await
    }
}

#[async_trait]
impl HealthSource for AgentCatalog {
    async fn health_of(&self, agent_id: &str) -> HealthReport {
        match self.agents.get(agent_id) {
            Some(agent) => agent.health_check().await,
            None => HealthReport::unhealthy(),
        }
    }
}

/// Echoes its input back unchanged. Used to seed a fresh deployment and in
/// the end-to-end "simple echo" scenario (spec §8.1).
pub struct EchoAgent {
    id: String,
}

impl EchoAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value) -> Result<Value> {
        Ok(input)
    }
}
