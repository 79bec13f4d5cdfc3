//! Condition evaluator: tagged-variant dispatch over the `Condition` AST
//! (§4.3.1), walking dotted paths into the execution context's state map.

use orch_core::types::{Condition, ConditionOp, SimpleCondition};
use orch_core::value::{Map, Value};
use regex::Regex;

fn get_path<'a>(state: &'a Map, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = state.get(parts.next()?)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

fn numeric_cmp(actual: &Value, expected: Option<&Value>, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.and_then(Value::as_f64)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn contains(actual: &Value, target: Option<&Value>) -> bool {
    let Some(target) = target else { return false };
    match actual {
        Value::List(items) => items.contains(target),
        Value::String(haystack) => target.as_str().map(|needle| haystack.contains(needle)).unwrap_or(false),
        _ => false,
    }
}

fn regex_matches(actual: &Value, pattern: Option<&Value>) -> bool {
    match (actual.as_str(), pattern.and_then(Value::as_str)) {
        (Some(s), Some(p)) => Regex::new(p).map(|re| re.is_match(s)).unwrap_or(false),
        _ => false,
    }
}

fn evaluate_simple(condition: &SimpleCondition, state: &Map) -> bool {
    let actual = get_path(state, &condition.field);

    match condition.op {
        ConditionOp::Exists => actual.is_some(),
        ConditionOp::NotExists => actual.is_none(),
        _ => {
            let Some(actual) = actual else { return false };
            let expected = condition.value.as_ref();
            match condition.op {
                ConditionOp::Equals => expected.map(|v| v == actual).unwrap_or(false),
                ConditionOp::NotEquals => expected.map(|v| v != actual).unwrap_or(false),
                ConditionOp::GreaterThan => numeric_cmp(actual, expected, |a, b| a > b),
                ConditionOp::LessThan => numeric_cmp(actual, expected, |a, b| a < b),
                ConditionOp::GreaterThanOrEqual => numeric_cmp(actual, expected, |a, b| a >= b),
                ConditionOp::LessThanOrEqual => numeric_cmp(actual, expected, |a, b| a <= b),
                ConditionOp::Contains => contains(actual, expected),
                ConditionOp::NotContains => !contains(actual, expected),
                ConditionOp::In => expected
                    .and_then(Value::as_list)
                    .map(|list| list.contains(actual))
                    .unwrap_or(false),
                ConditionOp::NotIn => !expected
                    .and_then(Value::as_list)
                    .map(|list| list.contains(actual))
                    .unwrap_or(false),
                ConditionOp::Regex => regex_matches(actual, expected),
                ConditionOp::Exists | ConditionOp::NotExists => unreachable!(),
            }
        }
    }
}

/// Truth value of a condition on its own, ignoring any `branch` step-list
/// semantics (used for `and`/`or` sub-conditions and for nested branches'
/// own condition check).
fn evaluate_bool(condition: &Condition, state: &Map) -> bool {
    match condition {
        Condition::Simple(c) => evaluate_simple(c, state),
        Condition::And(subs) => subs.iter().all(|c| evaluate_bool(c, state)),
        Condition::Or(subs) => subs.iter().any(|c| evaluate_bool(c, state)),
        Condition::Branch { branches, .. } => branches.iter().any(|b| evaluate_bool(&b.condition, state)),
    }
}

/// Whether `step_id` should run given its attached `condition` and the
/// current state map. For `branch`, this is membership in the first
/// matching branch's `steps`, or `else.steps` if none matched — not the
/// condition's own truth value.
pub fn should_execute(condition: &Condition, step_id: &str, state: &Map) -> bool {
    match condition {
        Condition::Branch { branches, r#else } => {
            for branch in branches {
                if evaluate_bool(&branch.condition, state) {
                    return branch.steps.iter().any(|s| s == step_id);
                }
            }
            r#else
                .as_ref()
                .map(|clause| clause.steps.iter().any(|s| s == step_id))
                .unwrap_or(false)
        }
        other => evaluate_bool(other, state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::types::{BranchClause, ElseClause};

    fn state_with(key: &str, value: Value) -> Map {
        let mut m = Map::new();
        m.insert(key.to_string(), value);
        m
    }

    fn simple(field: &str, op: ConditionOp, value: Option<Value>) -> Condition {
        Condition::Simple(SimpleCondition {
            field: field.to_string(),
            op,
            value,
        })
    }

    #[test]
    fn missing_field_resolves_per_operator() {
        let state = Map::new();
        assert!(!should_execute(&simple("x", ConditionOp::Equals, Some(Value::Number(1.0))), "s", &state));
        assert!(!should_execute(&simple("x", ConditionOp::Exists, None), "s", &state));
        assert!(should_execute(&simple("x", ConditionOp::NotExists, None), "s", &state));
    }

    #[test]
    fn equals_matches_present_field() {
        let state = state_with("score", Value::Number(5.0));
        assert!(should_execute(&simple("score", ConditionOp::Equals, Some(Value::Number(5.0))), "s", &state));
        assert!(!should_execute(&simple("score", ConditionOp::Equals, Some(Value::Number(6.0))), "s", &state));
    }

    #[test]
    fn and_or_truth_tables() {
        let state = state_with("a", Value::Bool(true));
        let cond_true = simple("a", ConditionOp::Equals, Some(Value::Bool(true)));
        let cond_false = simple("a", ConditionOp::Equals, Some(Value::Bool(false)));

        assert!(should_execute(&Condition::And(vec![cond_true.clone(), cond_true.clone()]), "s", &state));
        assert!(!should_execute(&Condition::And(vec![cond_true.clone(), cond_false.clone()]), "s", &state));
        assert!(should_execute(&Condition::Or(vec![cond_false.clone(), cond_true.clone()]), "s", &state));
        assert!(!should_execute(&Condition::Or(vec![cond_false.clone(), cond_false]), "s", &state));
    }

    #[test]
    fn branch_picks_first_matching_clause_else_falls_through() {
        let state = state_with("category", Value::String("b".to_string()));
        let condition = Condition::Branch {
            branches: vec![
                BranchClause {
                    condition: Box::new(simple("category", ConditionOp::Equals, Some(Value::String("a".to_string())))),
                    steps: vec!["step_a".to_string()],
                },
                BranchClause {
                    condition: Box::new(simple("category", ConditionOp::Equals, Some(Value::String("b".to_string())))),
                    steps: vec!["step_b".to_string()],
                },
            ],
            r#else: Some(ElseClause {
                steps: vec!["step_default".to_string()],
            }),
        };

        assert!(should_execute(&condition, "step_b", &state));
        assert!(!should_execute(&condition, "step_a", &state));
        assert!(!should_execute(&condition, "step_default", &state));
    }

    #[test]
    fn branch_falls_through_to_else_when_nothing_matches() {
        let state = state_with("category", Value::String("z".to_string()));
        let condition = Condition::Branch {
            branches: vec![BranchClause {
                condition: Box::new(simple("category", ConditionOp::Equals, Some(Value::String("a".to_string())))),
                steps: vec!["step_a".to_string()],
            }],
            r#else: Some(ElseClause {
                steps: vec!["step_default".to_string()],
            }),
        };

        assert!(should_execute(&condition, "step_default", &state));
        assert!(!should_execute(&condition, "step_a", &state));
    }

    #[test]
    fn regex_and_in_operators() {
        let state = state_with("name", Value::String("agent-42".to_string()));
        assert!(should_execute(&simple("name", ConditionOp::Regex, Some(Value::String("^agent-\\d+$".to_string()))), "s", &state));

        let state = state_with("tag", Value::String("blue".to_string()));
        let list = Value::List(vec![Value::String("red".to_string()), Value::String("blue".to_string())]);
        assert!(should_execute(&simple("tag", ConditionOp::In, Some(list)), "s", &state));
    }
}
