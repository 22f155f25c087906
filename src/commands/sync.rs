use anyhow::Result;
use colored::Colorize;
use intelligence::{
    EntityId, InferenceReport, SyncOutcome, SyncReport, SyncStatus, blocked_ids, sync_all,
    sync_entity,
};
use serde::Serialize;

use crate::Context;
use crate::commands::{self, infer};
use crate::progress::LayerProgress;
use crate::runner::SystemRunner;
use crate::ui;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncView<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    inference: Option<&'a InferenceReport>,
    sync: &'a SyncReport,
}

pub fn run(ctx: &Context, entity: Option<&str>, no_infer: bool, write: bool) -> Result<()> {
    let (mut graph, registry) = commands::load(ctx)?;

    let inference = if no_infer {
        None
    } else {
        Some(infer::run_pass(ctx, &mut graph, &registry)?)
    };
    let blocked = inference.as_ref().map(blocked_ids).unwrap_or_default();

    let runner = SystemRunner;
    let report = match entity {
        Some(id) => {
            let id = EntityId::new(id);
            if blocked.contains(&id) {
                anyhow::bail!("Cannot sync {id}: property inference failed for it or upstream");
            }
            let outcome = sync_entity(&mut graph, &registry, &runner, &id, &ctx.engine)?;
            let mut report = SyncReport::default();
            report.outcomes.insert(id, outcome);
            report
        }
        None => {
            if !blocked.is_empty() && !ctx.quiet && !ctx.json {
                ui::warn(&format!(
                    "{} entities have incomplete inferred properties",
                    blocked.len()
                ));
            }
            let mut progress = LayerProgress::new(graph.len(), ctx.quiet || ctx.json);
            let result = sync_all(&mut graph, &registry, &runner, &ctx.engine, &mut progress);
            progress.finish();
            result?
        }
    };

    if ctx.json {
        commands::print_json(&SyncView {
            inference: inference.as_ref(),
            sync: &report,
        })?;
    } else {
        ui::header("Resource Sync");
        for outcome in report.outcomes.values() {
            print_outcome(outcome, ctx.verbose > 0);
        }
        ui::summary(&report.summary(), "synced");
    }

    if write {
        commands::write_back(ctx, &graph)?;
    }

    let mut summary = report.summary();
    if let Some(inference) = &inference {
        summary.failed += inference.summary().failed;
    }
    commands::check(&summary, "Sync")
}

fn print_outcome(outcome: &SyncOutcome, show_logs: bool) {
    let id = &outcome.entity_id;
    match &outcome.status {
        SyncStatus::Synced => {
            let (health, status) = outcome
                .resource
                .as_ref()
                .map(|r| (ui::health(r.health), ui::status(r.status)))
                .unwrap_or_else(|| ("-".normal(), "-".normal()));
            println!("  {} {} {} / {}", "✓".green(), id, health, status);
        }
        SyncStatus::Skipped { reason } => {
            println!("  {} {} {}", "·".dimmed(), id, reason.dimmed());
        }
        SyncStatus::Failed { error } => {
            println!("  {} {} {}", "✗".red(), id, error.red());
            if let Some(output) = outcome
                .resource
                .as_ref()
                .and_then(|r| r.state.get("errorOutput"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty() && s.trim() != error.as_str())
            {
                for line in output.trim().lines() {
                    ui::dim(&format!("  {line}"));
                }
            }
        }
    }

    if show_logs && let Some(resource) = &outcome.resource {
        for entry in &resource.logs {
            let marker = if entry.fatal { "!" } else { " " };
            ui::dim(&format!(
                "  {marker}[{:?}] {} {}",
                entry.level,
                entry.message,
                serde_json::Value::Object(entry.payload.clone())
            ));
        }
    }
}
