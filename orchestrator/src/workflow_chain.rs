//! Workflow chaining: pipe one task's output into the next task's input,
//! ported from the original `workflow_chain.py`'s `WorkflowChain`.

use crate::engine::{Engine, TaskRecord};
use orch_core::error::{OrchError, Result};
use orch_core::types::TaskStatus;
use orch_core::value::{Map, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// How a step's output is combined with the running input before the next
/// step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// The next task's input is entirely the previous task's output.
    #[default]
    Replace,
    /// Map keys from the previous output are layered over the running input.
    Merge,
    /// Maps merge like `Merge`; for anything else the running input becomes
    /// a list with the new output appended.
    Append,
}

/// One link in a completed chain.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub task_id: orch_core::OrchId,
    pub task_type: String,
    pub input: Value,
    pub output: Value,
}

#[derive(Debug, Clone)]
pub struct ChainResult {
    pub final_output: Value,
    pub links: Vec<ChainLink>,
}

fn task_output(record: &TaskRecord) -> Value {
    record.result.clone().unwrap_or(Value::Null)
}

fn apply_merge(mode: MergeMode, current: Value, output: Value) -> Value {
    match mode {
        MergeMode::Replace => output,
        MergeMode::Merge => match (current, output) {
            (Value::Map(mut base), Value::Map(incoming)) => {
                base.extend(incoming);
                Value::Map(base)
            }
            (_, output) => output,
        },
        MergeMode::Append => match (current, output) {
            (Value::Map(mut base), Value::Map(incoming)) => {
                base.extend(incoming);
                Value::Map(base)
            }
            (Value::List(mut list), output) => {
                list.push(output);
                Value::List(list)
            }
            (current, output) => Value::List(vec![current, output]),
        },
    }
}

/// Run `task_types` in sequence against `engine`, feeding each step's result
/// into the next per `mode`. Stops at the first task that does not reach
/// `completed`/`partial`.
#[instrument(skip(engine, initial_input), fields(steps = task_types.len()))]
pub async fn chain_tasks(
    engine: &Engine,
    task_types: &[String],
    initial_input: Value,
    mode: MergeMode,
) -> Result<ChainResult> {
    let mut current_input = initial_input;
    let mut links = Vec::with_capacity(task_types.len());

    for task_type in task_types {
        let record = engine
            .execute_now(task_type.clone(), current_input.clone(), None)
            .await?;

        if !matches!(record.task.status, TaskStatus::Completed) {
            return Err(OrchError::planning(format!(
                "workflow chain stopped: task '{task_type}' ended with status {:?}",
                record.task.status
            )));
        }

        let output = task_output(&record);
        links.push(ChainLink {
            task_id: record.task.id,
            task_type: task_type.clone(),
            input: current_input.clone(),
            output: output.clone(),
        });
        current_input = apply_merge(mode, current_input, output);
    }

    info!(links = links.len(), "workflow chain completed");

    Ok(ChainResult {
        final_output: current_input,
        links,
    })
}

/// Extracts a named field from a completed chain link's output, the
/// Rust counterpart of `AgentResultPasser.prepare_next_input`'s field
/// remapping.
pub fn remap_fields(output: &Value, mapping: &[(String, String)]) -> Value {
    let Some(source) = output.as_map() else {
        return output.clone();
    };
    let mut mapped = Map::new();
    for (from, to) in mapping {
        if let Some(value) = source.get(from) {
            mapped.insert(to.clone(), value.clone());
        }
    }
    Value::Map(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_mode_layers_maps() {
        let mut base = Map::new();
        base.insert("a".to_string(), Value::Number(1.0));
        let mut incoming = Map::new();
        incoming.insert("b".to_string(), Value::Number(2.0));

        let merged = apply_merge(MergeMode::Merge, Value::Map(base), Value::Map(incoming));
        assert_eq!(merged.get_path("a"), Some(&Value::Number(1.0)));
        assert_eq!(merged.get_path("b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn append_mode_wraps_non_map_outputs_in_a_list() {
        let result = apply_merge(MergeMode::Append, Value::Number(1.0), Value::Number(2.0));
        assert_eq!(result, Value::List(vec![Value::Number(1.0), Value::Number(2.0)]));
    }

    #[test]
    fn remap_fields_keeps_only_mapped_keys() {
        let mut source = Map::new();
        source.insert("old_name".to_string(), Value::String("hi".to_string()));
        source.insert("unused".to_string(), Value::Bool(true));

        let mapped = remap_fields(
            &Value::Map(source),
            &[("old_name".to_string(), "new_name".to_string())],
        );
        assert_eq!(mapped.get_path("new_name"), Some(&Value::String("hi".to_string())));
        assert_eq!(mapped.get_path("unused"), None);
    }
}
