//! Composition root for the task orchestrator: wires the core crates
//! together behind an HTTP API and a CLI front-end.

pub mod agents;
pub mod api;
pub mod cli;
pub mod engine;
pub mod resource_estimator;
pub mod workflow_chain;

use orch_core::config::OrchestratorConfig;
use orch_core::traits::StateStore;
use orch_registry::AgentRegistry;
use std::sync::Arc;

use agents::{AgentCatalog, EchoAgent};
use engine::Engine;

/// Build a ready-to-serve `Engine` + `AgentCatalog` pair from configuration
/// and an already-constructed state store (sqlite wiring needs an async
/// connection pool, so the composition root builds it before calling this).
/// Always seeds an `echo_agent` (spec §8.1's end-to-end scenario) so a fresh
/// deployment has at least one working agent to submit tasks against.
pub fn bootstrap(config: OrchestratorConfig, state_store: Arc<dyn StateStore>) -> (Engine, AgentCatalog) {
    let registry = AgentRegistry::new();
    let catalog = AgentCatalog::new();

    let echo = Arc::new(EchoAgent::new("echo_agent"));
    registry.register(
        orch_core::types::AgentRecord::new("echo_agent", "Echo Agent")
            .with_capabilities(["echo", "test", "generic"]),
    );
    catalog.insert(echo);

    let health_source = catalog.clone();
    let invoker = catalog.clone();

    let engine = Engine::new(
        config,
        registry,
        state_store,
        Arc::new(invoker),
        Arc::new(health_source),
    );

    (engine, catalog)
}
