//! Capability/load/cost/health scoring over candidate agents (§4.2).

use async_trait::async_trait;
use orch_core::traits::HealthReport;
use orch_core::types::{AgentRecord, Step};
use orch_registry::AgentRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Per-call options influencing candidate discovery and cost filtering.
#[derive(Debug, Clone, Default)]
pub struct SelectorOptions {
    pub preferred_agents: Vec<String>,
    pub budget: Option<f64>,
}

/// Weighted sum coefficients for the four sub-scores. Must sum to 1;
/// `normalized()` rescales a caller-supplied set that doesn't.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub capability: f64,
    pub load: f64,
    pub cost: f64,
    pub health: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            capability: 0.40,
            load: 0.25,
            cost: 0.20,
            health: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn normalized(self) -> Self {
        let sum = self.capability + self.load + self.cost + self.health;
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            capability: self.capability / sum,
            load: self.load / sum,
            cost: self.cost / sum,
            health: self.health / sum,
        }
    }
}

/// Probes an agent's live health; implemented by the composition root over
/// the actual registered `Agent` trait objects so this crate stays free of a
/// dependency on agent implementations.
#[async_trait]
pub trait HealthSource: Send + Sync {
    async fn health_of(&self, agent_id: &str) -> HealthReport;
}

/// A `HealthSource` that reports every agent healthy; useful for tests and
/// for deployments that don't wire up real health probes.
pub struct AlwaysHealthy;

#[async_trait]
impl HealthSource for AlwaysHealthy {
    async fn health_of(&self, _agent_id: &str) -> HealthReport {
        HealthReport::healthy(1.0, 0.0)
    }
}

const COST_NORMALIZATION_CEILING: f64 = 0.1;
const LATENCY_NORMALIZATION_CEILING_MS: f64 = 1000.0;

/// The union of a step's explicit `capabilities_required`, its raw
/// `agent_type`, and — if that string ends in `_agent` — the stripped form.
pub fn required_capabilities(step: &Step) -> HashSet<String> {
    let mut caps: HashSet<String> = step.capabilities_required.iter().cloned().collect();
    caps.insert(step.agent_type.clone());
    if let Some(stripped) = step.agent_type.strip_suffix("_agent") {
        caps.insert(stripped.to_string());
    }
    caps
}

fn is_suitable(agent: &AgentRecord, step: &Step, required: &HashSet<String>) -> bool {
    use orch_core::types::AgentStatus;
    agent.status == AgentStatus::Active
        && (agent.agent_id == step.agent_type
            || required.iter().any(|cap| agent.has_capability(cap)))
}

/// Candidate discovery cascade (§4.2 a/b/c).
fn discover_candidates(
    registry: &AgentRegistry,
    step: &Step,
    options: &SelectorOptions,
    required: &HashSet<String>,
) -> Vec<AgentRecord> {
    if !options.preferred_agents.is_empty() {
        return options
            .preferred_agents
            .iter()
            .filter_map(|id| registry.get(id))
            .filter(|agent| is_suitable(agent, step, required))
            .collect();
    }

    let active = registry.active();
    let by_type_or_capability: Vec<AgentRecord> = active
        .iter()
        .filter(|agent| {
            agent.agent_id == step.agent_type
                || step.agent_type.starts_with(&agent.agent_id)
                || agent.has_capability(&step.agent_type)
        })
        .cloned()
        .collect();

    if !by_type_or_capability.is_empty() {
        return by_type_or_capability;
    }

    let mut seen = HashSet::new();
    let mut by_capability = Vec::new();
    for cap in required {
        for agent in registry.active_with_capability(cap) {
            if seen.insert(agent.agent_id.clone()) {
                by_capability.push(agent);
            }
        }
    }
    by_capability
}

fn capability_score(agent: &AgentRecord, required: &HashSet<String>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let matched = required.iter().filter(|cap| agent.has_capability(cap)).count();
    matched as f64 / required.len() as f64
}

fn load_score(registry: &AgentRegistry, agent: &AgentRecord) -> f64 {
    let current = registry.workload_of(&agent.agent_id) as f64;
    let max = agent.max_concurrency.max(1) as f64;
    1.0 - (current / max).min(1.0)
}

fn cost_score(agent: &AgentRecord, options: &SelectorOptions) -> f64 {
    if let Some(budget) = options.budget {
        if agent.cost_per_call > budget {
            return 0.0;
        }
    }
    1.0 - (agent.cost_per_call / COST_NORMALIZATION_CEILING).min(1.0)
}

fn health_score(report: &HealthReport) -> f64 {
    if !report.healthy {
        return 0.0;
    }
    0.7 * report.success_rate + 0.3 * (1.0 - (report.latency_ms / LATENCY_NORMALIZATION_CEILING_MS).min(1.0))
}

/// Pick the highest-scoring agent for a step, or `None` if no candidate is
/// suitable. Deterministic given frozen inputs: identical registry state,
/// load map, and health reports always pick the same agent id regardless of
/// call order, since scoring is a pure function of that state and ties break
/// on agent id lexical order.
pub async fn select_for_step(
    step: &Step,
    options: &SelectorOptions,
    registry: &AgentRegistry,
    health_source: &dyn HealthSource,
    weights: ScoringWeights,
) -> Option<AgentRecord> {
    let required = required_capabilities(step);
    let mut candidates = discover_candidates(registry, step, options, &required);
    candidates.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

    let weights = weights.normalized();
    let mut best: Option<(f64, AgentRecord)> = None;

    for candidate in candidates {
        let health = health_source.health_of(&candidate.agent_id).await;
        let score = weights.capability * capability_score(&candidate, &required)
            + weights.load * load_score(registry, &candidate)
            + weights.cost * cost_score(&candidate, options)
            + weights.health * health_score(&health);

        debug!(agent_id = %candidate.agent_id, step_id = %step.step_id, score, "scored candidate");

        // Candidates are visited in agent-id lexical order, so the first
        // candidate to reach a given score already wins that tie; only a
        // strictly higher score displaces it.
        let should_replace = match &best {
            None => true,
            Some((best_score, _)) => score > *best_score,
        };
        if should_replace {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, agent)| agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::types::{AgentRecord, Step};

    fn registry_with(agents: Vec<AgentRecord>) -> AgentRegistry {
        let registry = AgentRegistry::new();
        for agent in agents {
            registry.register(agent);
        }
        registry
    }

    fn step(agent_type: &str, caps: &[&str]) -> Step {
        let mut s = Step::new("s1", agent_type);
        s.capabilities_required = caps.iter().map(|c| c.to_string()).collect();
        s
    }

    #[tokio::test]
    async fn picks_sole_matching_agent() {
        let registry = registry_with(vec![AgentRecord::new("echo_agent", "Echo")
            .with_capabilities(["echo", "test", "generic"])]);
        let step = step("echo_agent", &[]);

        let picked = select_for_step(
            &step,
            &SelectorOptions::default(),
            &registry,
            &AlwaysHealthy,
            ScoringWeights::default(),
        )
        .await
        .unwrap();

        assert_eq!(picked.agent_id, "echo_agent");
    }

    #[tokio::test]
    async fn no_candidates_returns_none() {
        let registry = registry_with(vec![]);
        let step = step("generic_agent", &["generic"]);

        let picked = select_for_step(
            &step,
            &SelectorOptions::default(),
            &registry,
            &AlwaysHealthy,
            ScoringWeights::default(),
        )
        .await;

        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn prefers_less_loaded_agent_among_equal_capability() {
        let registry = registry_with(vec![
            AgentRecord::new("analysis_agent_a", "A").with_capabilities(["analysis"]),
            AgentRecord::new("analysis_agent_b", "B").with_capabilities(["analysis"]),
        ]);
        registry.increment_workload("analysis_agent_a");
        registry.increment_workload("analysis_agent_a");

        let step = step("analysis_agent", &["analysis"]);
        let picked = select_for_step(
            &step,
            &SelectorOptions::default(),
            &registry,
            &AlwaysHealthy,
            ScoringWeights::default(),
        )
        .await
        .unwrap();

        assert_eq!(picked.agent_id, "analysis_agent_b");
    }

    #[tokio::test]
    async fn is_deterministic_regardless_of_candidate_iteration_order() {
        let registry = registry_with(vec![
            AgentRecord::new("zeta_agent", "Z").with_capabilities(["generic"]),
            AgentRecord::new("alpha_agent", "A").with_capabilities(["generic"]),
        ]);
        let step = step("generic_agent", &["generic"]);

        let first = select_for_step(
            &step,
            &SelectorOptions::default(),
            &registry,
            &AlwaysHealthy,
            ScoringWeights::default(),
        )
        .await;
        let second = select_for_step(
            &step,
            &SelectorOptions::default(),
            &registry,
            &AlwaysHealthy,
            ScoringWeights::default(),
        )
        .await;

        assert_eq!(first.map(|a| a.agent_id), second.map(|a| a.agent_id));
    }
}
