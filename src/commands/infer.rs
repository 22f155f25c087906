use anyhow::Result;
use colored::Colorize;
use intelligence::{EntityGraph, InferenceOutcome, InferenceReport, Registry, infer};

use crate::Context;
use crate::commands;
use crate::progress::LayerProgress;
use crate::ui;

pub fn run(ctx: &Context, write: bool) -> Result<()> {
    let (mut graph, registry) = commands::load(ctx)?;
    let report = run_pass(ctx, &mut graph, &registry)?;

    if ctx.json {
        commands::print_json(&report)?;
    } else {
        print_report(&graph, &report);
        ui::summary(&report.summary(), "inferred");
    }

    if write {
        commands::write_back(ctx, &graph)?;
    }
    commands::check(&report.summary(), "Inference")
}

/// Run inference with a progress bar; shared with `sync`
pub fn run_pass(
    ctx: &Context,
    graph: &mut EntityGraph,
    registry: &Registry,
) -> Result<InferenceReport> {
    let mut progress = LayerProgress::new(graph.len(), ctx.quiet || ctx.json);
    let report = infer(graph, registry, &ctx.engine, &mut progress);
    progress.finish();
    Ok(report?)
}

fn print_report(graph: &EntityGraph, report: &InferenceReport) {
    ui::header("Property Inference");
    for (id, outcome) in &report.outcomes {
        match outcome {
            InferenceOutcome::Inferred => {
                let inferred = graph
                    .entity(id)
                    .ok()
                    .and_then(|e| e.properties.inferred.baseline())
                    .map(|b| serde_json::Value::Object(b.clone()).to_string())
                    .unwrap_or_default();
                println!("  {} {} {}", "✓".green(), id, inferred.dimmed());
            }
            InferenceOutcome::Unchanged => {
                println!("  {} {} {}", "·".dimmed(), id, "unchanged".dimmed());
            }
            InferenceOutcome::Failed { error } => {
                println!("  {} {} {}", "✗".red(), id, error.red());
            }
            InferenceOutcome::Blocked { by } => {
                println!("  {} {} blocked by {}", "⊘".yellow(), id, by);
            }
        }
    }
}
