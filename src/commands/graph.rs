use anyhow::Result;
use colored::Colorize;
use intelligence::{EntityGraph, EntityId, Registry};
use serde::Serialize;

use crate::Context;
use crate::commands;
use crate::ui;

#[derive(Serialize)]
struct GraphView<'a> {
    order: Vec<&'a EntityId>,
    layers: Vec<Vec<EntityId>>,
}

pub fn run(ctx: &Context) -> Result<()> {
    let (graph, registry) = commands::load(ctx)?;

    let view = GraphView {
        order: graph.topological_order().collect(),
        layers: graph.layers(),
    };

    if ctx.json {
        return commands::print_json(&view);
    }

    ui::header(&format!("Entity Graph ({} entities)", graph.len()));
    let order: Vec<&str> = view.order.iter().map(|id| id.as_str()).collect();
    ui::dim(&format!("order: {}", order.join(" → ")));
    for (depth, layer) in view.layers.iter().enumerate() {
        ui::section(&format!("Layer {depth}"));
        for id in layer {
            print_entity(&graph, &registry, id);
        }
    }
    Ok(())
}

fn print_entity(graph: &EntityGraph, registry: &Registry, id: &EntityId) {
    let Ok(entity) = graph.entity(id) else {
        return;
    };
    // Types without intelligence would fail infer/sync up front
    let object_type = if registry.contains(&entity.object_type) {
        entity.object_type.cyan()
    } else {
        entity.object_type.red()
    };
    let successors: Vec<String> = graph
        .successors_of(id)
        .map(|s| s.iter().map(|e| e.id.to_string()).collect())
        .unwrap_or_default();

    let mut line = format!("  {} {} {}", id.to_string().bold(), object_type, entity.name.dimmed());
    if !successors.is_empty() {
        line.push_str(&format!(" {} {}", "→".dimmed(), successors.join(", ")));
    }
    println!("{line}");
}
