//! Compiles a `Task` into a workflow DAG by template match and dependency
//! analysis (§4.1).

pub mod planner;
pub mod templates;

pub use planner::{calculate_execution_order, calculate_parallel_groups, plan};
pub use templates::{get_template, list_templates, match_template, register_template, StepDescriptor, Template};
