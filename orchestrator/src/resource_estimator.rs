//! Resource estimation for workflows and bare task types, ported from the
//! original `resource_estimator.py`'s per-agent-type cost/time tables.

use once_cell::sync::Lazy;
use orch_core::types::{Step, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Cost per second of agent runtime, by agent type. Falls back to
/// `generic_agent`'s rate for anything unlisted.
static AGENT_COSTS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("research_agent", 0.0001),
        ("analysis_agent", 0.00005),
        ("code_generation_agent", 0.0002),
        ("validation_agent", 0.00003),
        ("generic_agent", 0.00005),
        ("synthesis_agent", 0.00008),
        ("requirements_agent", 0.00005),
        ("transformation_agent", 0.00005),
        ("aggregation_agent", 0.00003),
    ])
});

/// Default wall-clock estimate (seconds) for a step, by agent type.
static AGENT_TIME_ESTIMATES: Lazy<HashMap<&'static str, u64>> = Lazy::new(|| {
    HashMap::from([
        ("research_agent", 60),
        ("analysis_agent", 30),
        ("code_generation_agent", 120),
        ("validation_agent", 20),
        ("generic_agent", 10),
        ("synthesis_agent", 45),
        ("requirements_agent", 30),
        ("transformation_agent", 30),
        ("aggregation_agent", 20),
    ])
});

const BASE_MEMORY_PER_STEP_MB: u64 = 100;
const CPU_CORES_PER_CONCURRENT_AGENT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub estimated_time_seconds: u64,
    pub estimated_cost: f64,
    pub required_agents: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub memory_estimate_mb: Option<u64>,
    pub cpu_estimate: Option<f64>,
}

fn step_time(step: &Step) -> u64 {
    step.estimated_time.unwrap_or_else(|| {
        *AGENT_TIME_ESTIMATES
            .get(step.agent_type.as_str())
            .unwrap_or(&AGENT_TIME_ESTIMATES["generic_agent"])
    })
}

fn step_cost(step: &Step) -> f64 {
    if let Some(cost) = step.estimated_cost {
        return cost;
    }
    let per_second = AGENT_COSTS
        .get(step.agent_type.as_str())
        .unwrap_or(&AGENT_COSTS["generic_agent"]);
    step_time(step) as f64 * per_second
}

/// Estimate a single step in isolation.
pub fn estimate_step(step: &Step) -> ResourceEstimate {
    ResourceEstimate {
        estimated_time_seconds: step_time(step),
        estimated_cost: step_cost(step),
        required_agents: vec![step.agent_type.clone()],
        required_capabilities: step.capabilities_required.clone(),
        memory_estimate_mb: None,
        cpu_estimate: None,
    }
}

/// Estimate a planned workflow: time sums the max step time per parallel
/// group (groups run concurrently, so wall-clock is bounded by the slowest
/// member); cost sums every step's individual cost.
pub fn estimate_workflow(workflow: &Workflow) -> ResourceEstimate {
    let mut total_time = 0u64;
    let mut total_cost = 0.0;
    let mut required_agents = HashSet::new();
    let mut required_capabilities = HashSet::new();

    for group in &workflow.parallel_groups {
        let mut group_max_time = 0u64;
        for step_id in group {
            let Some(step) = workflow.get_step(step_id) else {
                continue;
            };
            group_max_time = group_max_time.max(step_time(step));
            total_cost += step_cost(step);
            required_agents.insert(step.agent_type.clone());
            required_capabilities.extend(step.capabilities_required.iter().cloned());
        }
        total_time += group_max_time;
    }

    let max_parallel = workflow
        .parallel_groups
        .iter()
        .map(|g| g.len())
        .max()
        .unwrap_or(1)
        .max(1);

    ResourceEstimate {
        estimated_time_seconds: total_time,
        estimated_cost: (total_cost * 10_000.0).round() / 10_000.0,
        required_agents: required_agents.into_iter().collect(),
        required_capabilities: required_capabilities.into_iter().collect(),
        memory_estimate_mb: Some(workflow.len() as u64 * BASE_MEMORY_PER_STEP_MB),
        cpu_estimate: Some(max_parallel as f64 * CPU_CORES_PER_CONCURRENT_AGENT),
    }
}

/// Quick estimate for a bare task type, before planning has run — used by
/// `POST /tasks`'s `estimated_completion` response field.
pub fn estimate_task(task_type: &str) -> ResourceEstimate {
    let lower = task_type.to_lowercase();
    let (time, cost) = if lower.contains("research") {
        (60, 0.02)
    } else if lower.contains("code") || lower.contains("generate") {
        (120, 0.05)
    } else if lower.contains("analyze") {
        (30, 0.01)
    } else {
        (30, 0.01)
    };

    ResourceEstimate {
        estimated_time_seconds: time,
        estimated_cost: cost,
        required_agents: vec!["generic_agent".to_string()],
        required_capabilities: vec![task_type.to_string()],
        memory_estimate_mb: None,
        cpu_estimate: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::types::Task;
    use orch_core::value::Value;

    #[test]
    fn simple_template_estimate_sums_its_one_group() {
        let task = Task::new("simple", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();
        let estimate = estimate_workflow(&workflow);
        assert_eq!(estimate.estimated_time_seconds, 10);
        assert!(estimate.required_agents.contains(&"generic_agent".to_string()));
    }

    #[test]
    fn parallel_groups_take_the_max_not_the_sum() {
        let task = Task::new("parallel_analysis", Value::map());
        let workflow = orch_planner::plan(&task).unwrap();
        let estimate = estimate_workflow(&workflow);
        // analyze_item_1 + analyze_item_2 run concurrently (max 30s, not 60s),
        // then aggregate (20s) runs after: 30 + 20 = 50.
        assert_eq!(estimate.estimated_time_seconds, 50);
        assert_eq!(estimate.cpu_estimate, Some(1.0));
    }

    #[test]
    fn task_level_estimate_buckets_by_type_keyword() {
        let estimate = estimate_task("research_topic");
        assert_eq!(estimate.estimated_time_seconds, 60);
    }
}
