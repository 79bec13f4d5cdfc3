//! Final-result aggregation over a finished `ExecutionContext` (§4.3.3).

use orch_core::types::{ExecutionContext, Workflow};
use orch_core::value::{Map, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    #[default]
    Final,
    All,
    Merge,
    FanIn,
}

fn all_results_map(ctx: &ExecutionContext) -> Map {
    ctx.step_results
        .iter()
        .map(|(id, v)| (id.clone(), v.clone()))
        .collect()
}

/// Apply `mode` to produce the aggregated result value once every step in
/// `workflow` has settled.
pub fn aggregate(workflow: &Workflow, ctx: &ExecutionContext, mode: AggregationMode) -> Value {
    match mode {
        AggregationMode::Final => {
            let result = workflow
                .execution_order
                .last()
                .and_then(|id| ctx.step_results.get(id))
                .cloned()
                .unwrap_or(Value::Null);

            let mut out = Map::new();
            out.insert("result".to_string(), result);
            out.insert("all_results".to_string(), Value::Map(all_results_map(ctx)));
            out.insert("state".to_string(), Value::Map(ctx.state.clone()));
            Value::Map(out)
        }
        AggregationMode::All => Value::Map(all_results_map(ctx)),
        AggregationMode::Merge => {
            let mut merged = Map::new();
            for step_id in &workflow.execution_order {
                if let Some(result) = ctx.step_results.get(step_id) {
                    match result {
                        Value::Map(m) => merged.extend(m.clone()),
                        other => {
                            merged.insert(step_id.clone(), other.clone());
                        }
                    }
                } else if let Some(error) = ctx.errors.iter().find(|e| &e.step_id == step_id) {
                    let mut failed = Map::new();
                    failed.insert("status".to_string(), Value::String("failed".to_string()));
                    failed.insert("error".to_string(), Value::String(error.message.clone()));
                    merged.insert(step_id.clone(), Value::Map(failed));
                }
            }
            Value::Map(merged)
        }
        AggregationMode::FanIn => {
            let mut grouped = Map::new();
            for step in workflow.steps() {
                if let Some(result) = ctx.step_results.get(&step.step_id) {
                    let key = step.output_key.clone().unwrap_or_else(|| step.step_id.clone());
                    grouped.insert(key, result.clone());
                }
            }
            Value::Map(grouped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::id::OrchId;
    use orch_core::types::Step;

    fn workflow_with(steps: Vec<Step>, order: Vec<&str>) -> Workflow {
        let mut wf = Workflow::new("wf", "task", steps);
        wf.execution_order = order.into_iter().map(String::from).collect();
        wf
    }

    #[test]
    fn final_mode_wraps_last_step_and_all_results() {
        let wf = workflow_with(
            vec![Step::new("a", "generic_agent"), Step::new("b", "generic_agent")],
            vec!["a", "b"],
        );
        let mut ctx = ExecutionContext::new(OrchId::new());
        ctx.step_results.insert("a".to_string(), Value::Number(1.0));
        ctx.step_results.insert("b".to_string(), Value::Number(2.0));

        let value = aggregate(&wf, &ctx, AggregationMode::Final);
        assert_eq!(value.get_path("result"), Some(&Value::Number(2.0)));
        assert_eq!(value.get_path("all_results.a"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn merge_mode_unions_map_results_and_annotates_failures() {
        let wf = workflow_with(
            vec![Step::new("a", "generic_agent"), Step::new("b", "generic_agent")],
            vec!["a", "b"],
        );
        let mut ctx = ExecutionContext::new(OrchId::new());
        let mut a_result = Map::new();
        a_result.insert("x".to_string(), Value::Bool(true));
        ctx.step_results.insert("a".to_string(), Value::Map(a_result));
        ctx.record_failure("b", "boom");

        let value = aggregate(&wf, &ctx, AggregationMode::Merge);
        assert_eq!(value.get_path("x"), Some(&Value::Bool(true)));
        assert_eq!(value.get_path("b.status"), Some(&Value::String("failed".to_string())));
    }

    #[test]
    fn fan_in_groups_by_output_key() {
        let mut a = Step::new("a", "generic_agent");
        a.output_key = Some("first".to_string());
        let wf = workflow_with(vec![a], vec!["a"]);

        let mut ctx = ExecutionContext::new(OrchId::new());
        ctx.step_results.insert("a".to_string(), Value::Number(9.0));

        let value = aggregate(&wf, &ctx, AggregationMode::FanIn);
        assert_eq!(value.get_path("first"), Some(&Value::Number(9.0)));
    }
}
