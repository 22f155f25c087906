pub mod action;
pub mod doctor;
pub mod graph;
pub mod infer;
pub mod sync;

use crate::Context;
use crate::components;
use crate::snapshot;
use crate::ui;
use anyhow::{Context as _, Result};
use intelligence::{EntityGraph, ReconcileSummary, Registry};
use serde::Serialize;
use std::sync::Arc;

/// Load the snapshot graph and the built-in registry
pub fn load(ctx: &Context) -> Result<(EntityGraph, Arc<Registry>)> {
    let graph = snapshot::load_graph(&ctx.snapshot)?;
    let registry = components::registry(&ctx.config.docker_binary)?;
    Ok((graph, registry))
}

/// Write the graph back to the snapshot file
pub fn write_back(ctx: &Context, graph: &EntityGraph) -> Result<()> {
    snapshot::save(&ctx.snapshot, &graph.to_snapshot())?;
    if !ctx.quiet && !ctx.json {
        ui::dim(&format!("Wrote {}", ctx.snapshot.display()));
    }
    Ok(())
}

/// Print a report as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{rendered}");
    Ok(())
}

/// Turn failures in a summary into a non-zero exit
pub fn check(summary: &ReconcileSummary, what: &str) -> Result<()> {
    if summary.is_success() {
        Ok(())
    } else {
        let noun = if summary.failed == 1 { "entity" } else { "entities" };
        anyhow::bail!("{what} failed for {} {noun}", summary.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_passes_without_failures() {
        let summary = ReconcileSummary {
            succeeded: 3,
            skipped: 1,
            ..Default::default()
        };
        assert!(check(&summary, "sync").is_ok());
    }

    #[test]
    fn test_check_reports_failure_count() {
        let summary = ReconcileSummary {
            failed: 2,
            ..Default::default()
        };
        let err = check(&summary, "sync").unwrap_err();
        assert_eq!(err.to_string(), "sync failed for 2 entities");
    }
}
