//! Task -> DAG compilation: template match, input merge, topological order,
//! and parallel-group partitioning (§4.1).

use crate::templates::{get_template, match_template, StepDescriptor};
use orch_core::error::{OrchError, Result};
use orch_core::types::{Step, Task, Workflow};
use orch_core::value::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, instrument};

/// Compile a task into a workflow DAG.
///
/// Template selection never fails: an unrecognized task type falls through
/// to `simple`. Only a dependency cycle makes planning fatal.
#[instrument(skip(task), fields(task_type = %task.task_type))]
pub fn plan(task: &Task) -> Result<Workflow> {
    let template_name = match_template(&task.task_type);
    let template = get_template(&template_name).ok_or_else(|| {
        OrchError::planning(format!("template '{template_name}' is not registered"))
    })?;

    let steps = instantiate_steps(&template.steps, &task.input);
    let mut workflow = Workflow::new(
        task.workflow_name.clone().unwrap_or(template_name),
        task.task_type.clone(),
        steps,
    );

    let execution_order = calculate_execution_order(&workflow)?;
    let parallel_groups = calculate_parallel_groups(&workflow, &execution_order);

    workflow.execution_order = execution_order;
    workflow.parallel_groups = parallel_groups;

    info!(
        workflow_id = %workflow.id,
        steps = workflow.len(),
        groups = workflow.parallel_groups.len(),
        "planning complete"
    );

    Ok(workflow)
}

fn instantiate_steps(descriptors: &[StepDescriptor], task_input: &Value) -> Vec<Step> {
    descriptors
        .iter()
        .map(|descriptor| {
            let mut input = task_input.clone();
            if !matches!(input, Value::Map(_)) {
                input = Value::map();
            }
            if let Some(template_fields) = &descriptor.input_template {
                input.merge_map(template_fields);
            }

            let mut step = Step::new(descriptor.step_id.clone(), descriptor.agent_type.clone());
            step.input = input;
            step.capabilities_required = descriptor.capabilities_required.clone();
            step.depends_on = descriptor.depends_on.clone();
            step.output_key = descriptor.output_key.clone();
            step.fan_out = descriptor.fan_out;
            step.estimated_time = descriptor.estimated_time;
            step.estimated_cost = descriptor.estimated_cost;
            step
        })
        .collect()
}

/// Kahn's algorithm, with ties broken by insertion order so that repeated
/// planning of the same template is deterministic.
pub fn calculate_execution_order(workflow: &Workflow) -> Result<Vec<String>> {
    let steps = workflow.steps();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        indegree.entry(&step.step_id).or_insert(0);
        for dep in &step.depends_on {
            if !workflow.contains_step(dep) {
                return Err(OrchError::planning(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.step_id, dep
                )));
            }
            *indegree.entry(&step.step_id).or_insert(0) += 1;
            successors.entry(dep.as_str()).or_default().push(&step.step_id);
        }
    }

    let mut queue: VecDeque<&str> = steps
        .iter()
        .map(|s| s.step_id.as_str())
        .filter(|id| indegree[id] == 0)
        .collect();

    let mut order = Vec::with_capacity(steps.len());
    let mut emitted: HashSet<&str> = HashSet::new();

    while let Some(step_id) = queue.pop_front() {
        order.push(step_id.to_string());
        emitted.insert(step_id);

        if let Some(succs) = successors.get(step_id) {
            for &succ in succs {
                let entry = indegree.get_mut(succ).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    if order.len() != steps.len() {
        let remaining: Vec<&str> = steps
            .iter()
            .map(|s| s.step_id.as_str())
            .filter(|id| !emitted.contains(id))
            .collect();
        return Err(OrchError::planning(format!(
            "dependency cycle detected among steps: {}",
            remaining.join(", ")
        )));
    }

    Ok(order)
}

/// Greedy partition of the topological order into parallel groups: each step
/// joins the lowest-indexed group where no member depends on it and it
/// depends on no member.
pub fn calculate_parallel_groups(workflow: &Workflow, execution_order: &[String]) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut group_of: HashMap<&str, usize> = HashMap::new();

    for step_id in execution_order {
        let step = workflow.get_step(step_id).expect("step in execution order exists");

        let mut placement = 0usize;
        for dep in &step.depends_on {
            if let Some(&g) = group_of.get(dep.as_str()) {
                placement = placement.max(g + 1);
            }
        }

        while placement < groups.len()
            && groups[placement].iter().any(|member| {
                let member_step = workflow.get_step(member).unwrap();
                member_step.depends_on.iter().any(|d| d == step_id)
                    || step.depends_on.iter().any(|d| d == member)
            })
        {
            placement += 1;
        }

        if placement == groups.len() {
            groups.push(Vec::new());
        }
        groups[placement].push(step_id.clone());
        group_of.insert(step_id.as_str(), placement);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_template_plans_one_step() {
        let task = Task::new("simple", Value::map());
        let workflow = plan(&task).unwrap();
        assert_eq!(workflow.len(), 1);
        assert_eq!(workflow.execution_order, vec!["execute".to_string()]);
        assert_eq!(workflow.parallel_groups, vec![vec!["execute".to_string()]]);
    }

    #[test]
    fn research_and_analyze_is_strictly_sequential() {
        let task = Task::new("research_and_analyze", Value::map());
        let workflow = plan(&task).unwrap();
        assert_eq!(
            workflow.execution_order,
            vec!["research", "analyze", "synthesize"]
        );
        assert_eq!(
            workflow.parallel_groups,
            vec![vec!["research"], vec!["analyze"], vec!["synthesize"]]
        );
    }

    #[test]
    fn parallel_analysis_groups_independent_steps() {
        let task = Task::new("parallel_analysis", Value::map());
        let workflow = plan(&task).unwrap();
        assert_eq!(workflow.parallel_groups.len(), 2);
        let mut first_group = workflow.parallel_groups[0].clone();
        first_group.sort();
        assert_eq!(first_group, vec!["analyze_item_1", "analyze_item_2"]);
        assert_eq!(workflow.parallel_groups[1], vec!["aggregate"]);
    }

    #[test]
    fn unknown_task_type_falls_back_to_simple() {
        let task = Task::new("a_type_nobody_registered", Value::map());
        let workflow = plan(&task).unwrap();
        assert_eq!(workflow.task_type, "a_type_nobody_registered");
        assert_eq!(workflow.execution_order, vec!["execute".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut a = Step::new("a", "generic_agent");
        a.depends_on = vec!["b".to_string()];
        let mut b = Step::new("b", "generic_agent");
        b.depends_on = vec!["a".to_string()];
        let workflow = Workflow::new("cyclic", "cyclic", vec![a, b]);

        let result = calculate_execution_order(&workflow);
        assert!(matches!(result, Err(OrchError::Planning(_))));
    }

    #[test]
    fn dependency_on_unknown_step_is_a_planning_error() {
        let mut a = Step::new("a", "generic_agent");
        a.depends_on = vec!["ghost".to_string()];
        let workflow = Workflow::new("broken", "broken", vec![a]);

        let result = calculate_execution_order(&workflow);
        assert!(result.is_err());
    }
}
