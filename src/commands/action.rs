use anyhow::{Context as _, Result};
use colored::Colorize;
use intelligence::{ActionPlan, ActionState, EntityId, dispatch};
use serde_json::Value;

use crate::Context;
use crate::commands;
use crate::ui;

pub fn run(
    ctx: &Context,
    name: &str,
    entity: &str,
    context: Option<&str>,
    write: bool,
) -> Result<()> {
    let context = parse_context(context)?;
    let (mut graph, registry) = commands::load(ctx)?;
    let plan = dispatch(&mut graph, &registry, &EntityId::new(entity), name, &context)?;

    if ctx.json {
        commands::print_json(&plan)?;
    } else {
        ui::header(&format!("Action {name} on {entity}"));
        for line in render_tree(&plan) {
            println!("{line}");
        }
        ui::summary(&plan.summary(), "succeeded");
    }

    if write {
        commands::write_back(ctx, &graph)?;
    }
    commands::check(&plan.summary(), "Action")
}

/// Parse `--context`; absent means null
fn parse_context(raw: Option<&str>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let value: Value = serde_json::from_str(raw).context("Invalid --context JSON")?;
    if !value.is_object() {
        anyhow::bail!("--context must be a JSON object");
    }
    Ok(value)
}

/// One line per plan node, children indented under their parent
fn render_tree(plan: &ActionPlan) -> Vec<String> {
    let mut lines = Vec::new();
    if plan.nodes.is_empty() {
        return lines;
    }

    let mut stack = vec![(0usize, 0usize)];
    while let Some((index, depth)) = stack.pop() {
        let node = &plan.nodes[index];
        let indent = "  ".repeat(depth + 1);
        let line = match &node.state {
            ActionState::Succeeded => {
                format!("{indent}{} {} {}", "✓".green(), node.entity_id, node.action)
            }
            ActionState::Failed { error } => format!(
                "{indent}{} {} {} {}",
                "✗".red(),
                node.entity_id,
                node.action,
                error.red()
            ),
            ActionState::Pending | ActionState::Running => format!(
                "{indent}{} {} {}",
                "·".dimmed(),
                node.entity_id,
                node.action
            ),
        };
        lines.push(line);
        stack.extend(node.children.iter().rev().map(|c| (*c, depth + 1)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelligence::ActionNode;

    fn node(id: &str, state: ActionState, parent: Option<usize>, children: Vec<usize>) -> ActionNode {
        ActionNode {
            entity_id: id.into(),
            action: "deploy".to_string(),
            state,
            parent,
            children,
            reply: None,
            logs: Vec::new(),
        }
    }

    #[test]
    fn test_parse_context() {
        assert_eq!(parse_context(None).unwrap(), Value::Null);
        let value = parse_context(Some(r#"{"ticket": "OPS-7"}"#)).unwrap();
        assert_eq!(value["ticket"], "OPS-7");
        assert!(parse_context(Some("not json")).is_err());
        assert!(parse_context(Some("[1, 2]")).is_err());
    }

    #[test]
    fn test_render_tree_orders_depth_first() {
        colored::control::set_override(false);
        let plan = ActionPlan {
            nodes: vec![
                node("x", ActionState::Succeeded, None, vec![1, 2]),
                node("y", ActionState::Succeeded, Some(0), vec![3]),
                node(
                    "z",
                    ActionState::Failed {
                        error: "boom".into(),
                    },
                    Some(0),
                    vec![],
                ),
                node("w", ActionState::Succeeded, Some(1), vec![]),
            ],
        };

        let lines = render_tree(&plan);
        assert_eq!(
            lines,
            vec![
                "  ✓ x deploy",
                "    ✓ y deploy",
                "      ✓ w deploy",
                "    ✗ z deploy boom",
            ]
        );
    }

    #[test]
    fn test_render_empty_plan() {
        assert!(render_tree(&ActionPlan::default()).is_empty());
    }
}
