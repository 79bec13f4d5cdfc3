//! Fan-out dispatch: one synthetic child step per item in the resolved
//! input's `items` list, run concurrently (§4.3.4).

use crate::dispatch::dispatch_single;
use crate::ExecutorDeps;
use futures::future::join_all;
use orch_core::types::Step;
use orch_core::value::Value;

/// Per-item outcomes in original input order (`None` for a failed item),
/// plus the failure messages folded into the parent step's error record.
pub struct FanOutResult {
    pub items: Vec<Option<Value>>,
    pub failures: Vec<String>,
}

pub async fn run_fan_out(step: &Step, input: Value, deps: &ExecutorDeps<'_>) -> FanOutResult {
    let items = input
        .get_path("items")
        .and_then(Value::as_list)
        .map(|l| l.to_vec())
        .unwrap_or_default();

    let base = input.as_map().cloned().unwrap_or_default();

    let calls = items.iter().enumerate().map(|(index, item)| {
        let mut child_input = base.clone();
        child_input.remove("items");
        child_input.insert("item".to_string(), item.clone());
        child_input.insert("item_index".to_string(), Value::Number(index as f64));
        dispatch_single(step, Value::Map(child_input), deps)
    });

    let outcomes = join_all(calls).await;

    let mut ordered = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => ordered.push(Some(value)),
            Err(error) => {
                failures.push(format!("item {index}: {error}"));
                ordered.push(None);
            }
        }
    }

    FanOutResult { items: ordered, failures }
}
