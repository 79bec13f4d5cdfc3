//! Input resolution: dependency-result merge followed by `{{a.b.c}}`
//! template substitution against the workflow state map (§4.3.2).

use once_cell::sync::Lazy;
use orch_core::types::{ExecutionContext, Step};
use orch_core::value::{Map, Value};
use regex::Regex;

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*([A-Za-z0-9_.]+)\s*\}\}$").unwrap());

fn get_path<'a>(state: &'a Map, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = state.get(parts.next()?)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// A full-string `{{a.b.c}}` match replaces the whole value (preserving the
/// resolved value's type); a non-matching string, or an unresolved path, is
/// left verbatim.
fn substitute(value: &mut Value, state: &Map) {
    match value {
        Value::String(s) => {
            if let Some(caps) = TEMPLATE_RE.captures(s) {
                if let Some(resolved) = get_path(state, &caps[1]) {
                    *value = resolved.clone();
                }
            }
        }
        Value::List(items) => {
            for item in items {
                substitute(item, state);
            }
        }
        Value::Map(map) => {
            for v in map.values_mut() {
                substitute(v, state);
            }
        }
        _ => {}
    }
}

/// Build a step's effective input: its declared input, augmented per
/// dependency (map results merge their keys in, non-map results land under
/// `<dep_id>_result`), then template-substituted against the context's
/// state map.
pub fn resolve_input(step: &Step, ctx: &ExecutionContext) -> Value {
    let mut input = step.input.clone();
    if !matches!(input, Value::Map(_)) {
        input = Value::map();
    }

    for dep in &step.depends_on {
        let Some(result) = ctx.step_results.get(dep) else {
            continue;
        };
        match result {
            Value::Map(m) => input.merge_map(m),
            other => {
                if let Some(map) = input.as_map_mut() {
                    map.insert(format!("{dep}_result"), other.clone());
                }
            }
        }
    }

    substitute(&mut input, &ctx.state);
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::id::OrchId;

    #[test]
    fn map_dependency_results_merge_their_keys() {
        let mut step = Step::new("s2", "generic_agent");
        step.depends_on = vec!["s1".to_string()];

        let mut ctx = ExecutionContext::new(OrchId::new());
        let mut dep_result = Map::new();
        dep_result.insert("found".to_string(), Value::Bool(true));
        ctx.step_results.insert("s1".to_string(), Value::Map(dep_result));

        let input = resolve_input(&step, &ctx);
        assert_eq!(input.get_path("found"), Some(&Value::Bool(true)));
    }

    #[test]
    fn non_map_dependency_result_lands_under_suffixed_key() {
        let mut step = Step::new("s2", "generic_agent");
        step.depends_on = vec!["s1".to_string()];

        let mut ctx = ExecutionContext::new(OrchId::new());
        ctx.step_results.insert("s1".to_string(), Value::Number(42.0));

        let input = resolve_input(&step, &ctx);
        assert_eq!(input.get_path("s1_result"), Some(&Value::Number(42.0)));
    }

    #[test]
    fn full_string_template_is_substituted_preserving_type() {
        let mut step = Step::new("s1", "generic_agent");
        step.input = {
            let mut m = Map::new();
            m.insert("count".to_string(), Value::String("{{totals.count}}".to_string()));
            Value::Map(m)
        };

        let mut ctx = ExecutionContext::new(OrchId::new());
        let mut totals = Map::new();
        totals.insert("count".to_string(), Value::Number(7.0));
        ctx.state.insert("totals".to_string(), Value::Map(totals));

        let input = resolve_input(&step, &ctx);
        assert_eq!(input.get_path("count"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn unresolved_template_is_left_as_is() {
        let mut step = Step::new("s1", "generic_agent");
        step.input = {
            let mut m = Map::new();
            m.insert("x".to_string(), Value::String("{{missing.path}}".to_string()));
            Value::Map(m)
        };
        let ctx = ExecutionContext::new(OrchId::new());

        let input = resolve_input(&step, &ctx);
        assert_eq!(input.get_path("x"), Some(&Value::String("{{missing.path}}".to_string())));
    }
}
