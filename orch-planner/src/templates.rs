//! Workflow templates: pure data, name -> ordered list of step descriptors.
//!
//! The five exemplar templates are ported from the original implementation's
//! `orchestrator/templates.py::WORKFLOW_TEMPLATES` verbatim (step ids,
//! capability tags, dependency edges, time/cost estimates) since spec.md
//! leaves their exact shape to "at minimum the exemplars in the Glossary".

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub step_id: String,
    pub agent_type: String,
    pub capabilities_required: Vec<String>,
    pub depends_on: Vec<String>,
    pub output_key: Option<String>,
    pub estimated_time: Option<u64>,
    pub estimated_cost: Option<f64>,
    pub parallel: bool,
    pub fan_out: bool,
    /// Fields the template itself wants baked into every step's input,
    /// taking precedence over the task's own input on key collision (§4.1).
    #[serde(default)]
    pub input_template: Option<orch_core::Map>,
}

impl StepDescriptor {
    pub fn new(step_id: &str, agent_type: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            agent_type: agent_type.to_string(),
            capabilities_required: Vec::new(),
            depends_on: Vec::new(),
            output_key: None,
            estimated_time: None,
            estimated_cost: None,
            parallel: false,
            fan_out: false,
            input_template: None,
        }
    }

    pub fn caps(mut self, caps: &[&str]) -> Self {
        self.capabilities_required = caps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn deps(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn output(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    pub fn estimate(mut self, time: u64, cost: f64) -> Self {
        self.estimated_time = Some(time);
        self.estimated_cost = Some(cost);
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDescriptor>,
}

fn research_and_analyze() -> Template {
    Template {
        name: "research_and_analyze".to_string(),
        description: "Research a topic and analyze results".to_string(),
        steps: vec![
            StepDescriptor::new("research", "research_agent")
                .caps(&["research", "web_search"])
                .output("research_data")
                .estimate(60, 0.01),
            StepDescriptor::new("analyze", "analysis_agent")
                .caps(&["analysis", "data_processing"])
                .deps(&["research"])
                .output("analysis_results")
                .estimate(30, 0.005),
            StepDescriptor::new("synthesize", "synthesis_agent")
                .caps(&["synthesis", "writing"])
                .deps(&["analyze"])
                .output("final_result")
                .estimate(45, 0.008),
        ],
    }
}

fn code_generation() -> Template {
    Template {
        name: "code_generation".to_string(),
        description: "Generate code based on requirements".to_string(),
        steps: vec![
            StepDescriptor::new("analyze_requirements", "requirements_agent")
                .caps(&["analysis", "requirements"])
                .output("requirements")
                .estimate(30, 0.005),
            StepDescriptor::new("generate_code", "code_generation_agent")
                .caps(&["code_generation"])
                .deps(&["analyze_requirements"])
                .output("generated_code")
                .estimate(120, 0.02),
            StepDescriptor::new("validate_code", "validation_agent")
                .caps(&["validation", "code_review"])
                .deps(&["generate_code"])
                .output("validated_code")
                .estimate(20, 0.003),
        ],
    }
}

fn data_processing() -> Template {
    Template {
        name: "data_processing".to_string(),
        description: "Process and transform data".to_string(),
        steps: vec![
            StepDescriptor::new("validate_input", "validation_agent")
                .caps(&["validation"])
                .output("validated_data")
                .estimate(10, 0.002),
            StepDescriptor::new("transform", "transformation_agent")
                .caps(&["transformation", "data_processing"])
                .deps(&["validate_input"])
                .output("transformed_data")
                .estimate(30, 0.005),
        ],
    }
}

fn parallel_analysis() -> Template {
    Template {
        name: "parallel_analysis".to_string(),
        description: "Analyze multiple items in parallel".to_string(),
        steps: vec![
            StepDescriptor::new("analyze_item_1", "analysis_agent")
                .caps(&["analysis"])
                .output("result_1")
                .estimate(30, 0.005)
                .parallel(),
            StepDescriptor::new("analyze_item_2", "analysis_agent")
                .caps(&["analysis"])
                .output("result_2")
                .estimate(30, 0.005)
                .parallel(),
            StepDescriptor::new("aggregate", "aggregation_agent")
                .caps(&["aggregation"])
                .deps(&["analyze_item_1", "analyze_item_2"])
                .output("aggregated_result")
                .estimate(20, 0.003),
        ],
    }
}

fn simple() -> Template {
    Template {
        name: "simple".to_string(),
        description: "Simple single-step task".to_string(),
        steps: vec![StepDescriptor::new("execute", "generic_agent")
            .caps(&["generic"])
            .output("result")
            .estimate(10, 0.001)],
    }
}

static TEMPLATES: Lazy<RwLock<HashMap<String, Template>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for template in [
        research_and_analyze(),
        code_generation(),
        data_processing(),
        parallel_analysis(),
        simple(),
    ] {
        map.insert(template.name.clone(), template);
    }
    RwLock::new(map)
});

/// Register (or replace) a template at runtime.
pub fn register_template(template: Template) {
    TEMPLATES.write().insert(template.name.clone(), template);
}

pub fn get_template(name: &str) -> Option<Template> {
    TEMPLATES.read().get(name).cloned()
}

pub fn list_templates() -> Vec<String> {
    TEMPLATES.read().keys().cloned().collect()
}

/// Match a task type to a template name: exact registry match first, then
/// substring heuristics, falling back to `simple` (never fatal — §4.1).
pub fn match_template(task_type: &str) -> String {
    if TEMPLATES.read().contains_key(task_type) {
        return task_type.to_string();
    }

    let lower = task_type.to_lowercase();

    if lower.contains("research") && lower.contains("analyze") {
        return "research_and_analyze".to_string();
    }
    if lower.contains("code") {
        return "code_generation".to_string();
    }
    if lower.contains("process") && lower.contains("data") {
        return "data_processing".to_string();
    }
    if lower.contains("parallel") {
        return "parallel_analysis".to_string();
    }

    "simple".to_string()
}
