//! Resource sync coordinator
//!
//! Runs an entity's syncResource resolver inside a [`SyncContext`] that owns
//! the operation's event log, its credential staging area and the command
//! runner handle. Whatever the resolver does, the coordinator reduces the
//! result to a [`Resource`] and releases the staging area before returning.

use crate::context::{CommandRunner, ProgressCallback};
use crate::error::{Error, Result};
use crate::eventlog::EventLog;
use crate::graph::EntityGraph;
use crate::registry::{Registry, SyncResourceFn};
use crate::staging::StagingArea;
use crate::types::{
    CommandOutput, EngineOptions, Entity, EntityId, ExecOptions, ReconcileSummary, Resource,
    ResourceUpdate,
};
use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Input of a syncResource resolver
#[derive(Debug, Clone)]
pub struct SyncResourceRequest {
    pub entity: Entity,
    pub predecessors: Vec<Entity>,
    /// Previous resource of the entity, or an empty one
    pub resource: Resource,
}

impl SyncResourceRequest {
    /// Predecessors of the given object type
    pub fn predecessors_of_type<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a Entity> + 'a {
        self.predecessors
            .iter()
            .filter(move |p| p.object_type == object_type)
    }

    /// `state.data` of the previous resource
    pub fn previous_data(&self) -> Option<&Value> {
        self.resource.data()
    }
}

/// Handle given to a syncResource resolver
pub struct SyncContext<'a> {
    runner: &'a dyn CommandRunner,
    log: EventLog,
    staging: StagingArea,
    command_timeout: Option<Duration>,
}

impl<'a> SyncContext<'a> {
    pub fn new(entity_id: &EntityId, runner: &'a dyn CommandRunner, opts: &EngineOptions) -> Self {
        Self {
            runner,
            log: EventLog::new(entity_id.as_str()),
            staging: StagingArea::new(opts.staging_prefix.clone()),
            command_timeout: opts.command_timeout,
        }
    }

    /// The operation's event log
    pub fn log(&mut self) -> &mut EventLog {
        &mut self.log
    }

    /// Write a secret file into this operation's staging directory
    pub fn stage_secret(&mut self, name: &str, contents: &[u8]) -> anyhow::Result<&Path> {
        self.staging.write_secret(name, contents)?;
        self.staging.dir()
    }

    /// The staging directory, if anything has been staged
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging.path()
    }

    /// Run a command without raising on non-zero exit
    ///
    /// Uses the engine's default timeout. Fails only when the log has been
    /// marked fatal.
    pub fn exec(&mut self, command: &str, args: &[String]) -> Result<CommandOutput> {
        let opts = ExecOptions::default().with_timeout(self.command_timeout);
        self.exec_with(command, args, &opts)
    }

    /// Run a command with explicit options
    pub fn exec_with(
        &mut self,
        command: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> Result<CommandOutput> {
        self.log.checkpoint()?;

        let command_line = format!("{} {}", command, args.join(" "));
        self.log
            .debug("running command", json!({ "cmd": command_line.trim_end() }));

        let output = match self.runner.execute(command, args, opts) {
            Ok(output) => output,
            Err(e) if !opts.reject_on_nonzero => CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: e.to_string(),
                failed: true,
                timed_out: false,
            },
            Err(e) => return Err(e),
        };

        if output.failed {
            self.log.warn(
                "command failed",
                json!({
                    "cmd": command_line.trim_end(),
                    "exitCode": output.exit_code,
                    "timedOut": output.timed_out,
                    "stderr": output.stderr.trim(),
                }),
            );
            if opts.reject_on_nonzero {
                return Err(Error::CommandFailed {
                    command: command_line.trim_end().to_string(),
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }
        Ok(output)
    }
}

/// Sync status of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncStatus {
    /// The resolver produced a non-failure resource
    Synced,
    /// The resolver failed, logged a fatal entry or reported a failed resource
    Failed { error: String },
    /// The object type has no syncResource resolver
    Skipped { reason: String },
}

/// Result of syncing one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub entity_id: EntityId,
    #[serde(flatten)]
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, SyncStatus::Failed { .. })
    }
}

/// Per-entity results of a sync pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcomes: BTreeMap<EntityId, SyncOutcome>,
}

impl SyncReport {
    pub fn outcome(&self, id: &EntityId) -> Option<&SyncOutcome> {
        self.outcomes.get(id)
    }

    /// `SyncFailed` for every failed entity
    pub fn errors(&self) -> Vec<Error> {
        self.outcomes
            .values()
            .filter_map(|o| match &o.status {
                SyncStatus::Failed { error } => Some(Error::SyncFailed {
                    entity_id: o.entity_id.clone(),
                    cause: error.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for outcome in self.outcomes.values() {
            match outcome.status {
                SyncStatus::Synced => summary.succeeded += 1,
                SyncStatus::Failed { .. } => summary.failed += 1,
                SyncStatus::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

/// Sync a single entity and store the resulting resource on it
pub fn sync_entity(
    graph: &mut EntityGraph,
    registry: &Registry,
    runner: &dyn CommandRunner,
    id: &EntityId,
    opts: &EngineOptions,
) -> Result<SyncOutcome> {
    let job = prepare(graph, registry, id)?;
    let outcome = match job {
        Prepared::Run(resolver, request) => run_sync(&resolver, &request, runner, opts),
        Prepared::Skip(outcome) => outcome,
    };
    store(graph, &outcome)?;
    Ok(outcome)
}

/// Sync every entity, layer by layer
///
/// Entities of one layer are synced in parallel; a layer starts only after
/// the previous layer's resources have been stored, so resolvers see fresh
/// upstream state.
pub fn sync_all<P: ProgressCallback>(
    graph: &mut EntityGraph,
    registry: &Registry,
    runner: &dyn CommandRunner,
    opts: &EngineOptions,
    progress: &mut P,
) -> Result<SyncReport> {
    for entity in graph.entities() {
        registry.lookup(&entity.object_type)?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::SyncFailed {
            entity_id: EntityId::new("*"),
            cause: format!("failed to create thread pool: {e}"),
        })?;

    let mut report = SyncReport::default();

    for layer in graph.layers() {
        progress.on_layer_start(layer.len());

        let mut jobs = Vec::new();
        let mut outcomes = Vec::new();
        for id in &layer {
            match prepare(graph, registry, id)? {
                Prepared::Run(resolver, request) => jobs.push((resolver, request)),
                Prepared::Skip(outcome) => outcomes.push(outcome),
            }
        }

        let synced: Vec<SyncOutcome> = pool.install(|| {
            jobs.par_iter()
                .map(|(resolver, request)| run_sync(resolver, request, runner, opts))
                .collect()
        });
        outcomes.extend(synced);

        for outcome in outcomes {
            store(graph, &outcome)?;
            progress.on_entity_complete(&outcome.entity_id, &status_label(&outcome.status));
            report.outcomes.insert(outcome.entity_id.clone(), outcome);
        }

        progress.on_layer_complete();
    }

    let summary = report.summary();
    log::info!(
        "Sync complete: {} synced, {} failed, {} skipped",
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    Ok(report)
}

enum Prepared {
    Run(SyncResourceFn, SyncResourceRequest),
    Skip(SyncOutcome),
}

fn prepare(graph: &EntityGraph, registry: &Registry, id: &EntityId) -> Result<Prepared> {
    let entity = graph.entity(id)?;
    let definition = registry.lookup(&entity.object_type)?;
    let Some(resolver) = &definition.sync_resource else {
        return Ok(Prepared::Skip(SyncOutcome {
            entity_id: id.clone(),
            status: SyncStatus::Skipped {
                reason: format!("no syncResource for {}", entity.object_type),
            },
            resource: None,
        }));
    };
    let request = SyncResourceRequest {
        entity: entity.clone(),
        predecessors: graph
            .predecessors_of(id)?
            .into_iter()
            .cloned()
            .collect(),
        resource: entity.resource.clone().unwrap_or_default(),
    };
    Ok(Prepared::Run(resolver.clone(), request))
}

fn store(graph: &mut EntityGraph, outcome: &SyncOutcome) -> Result<()> {
    if let Some(resource) = &outcome.resource {
        graph.entity_mut(&outcome.entity_id)?.resource = Some(resource.clone());
    }
    Ok(())
}

/// Run one resolver and reduce its result to a resource
///
/// The staging area is released before this returns, on every path.
fn run_sync(
    resolver: &SyncResourceFn,
    request: &SyncResourceRequest,
    runner: &dyn CommandRunner,
    opts: &EngineOptions,
) -> SyncOutcome {
    let entity_id = request.entity.id.clone();
    log::debug!("Syncing {} ({})", entity_id, request.entity.object_type);

    let mut ctx = SyncContext::new(&entity_id, runner, opts);
    let result = resolver(request, &mut ctx);

    let SyncContext {
        mut log, staging, ..
    } = ctx;
    if let Err(e) = staging.release() {
        log.warn(
            "failed to remove staging directory",
            json!({ "failure": format!("{e:#}") }),
        );
    }

    let previous = request.previous_data();
    let (update, status) = match (result, log.fatal_reason()) {
        (_, Some(reason)) => (
            ResourceUpdate::failed(previous, "sync aborted by fatal log entry", &reason),
            SyncStatus::Failed { error: reason },
        ),
        (Err(e), None) => {
            let cause = format!("{e:#}");
            (
                ResourceUpdate::failed(previous, "syncResource resolver failed", &cause),
                SyncStatus::Failed { error: cause },
            )
        }
        (Ok(update), None) if update.status.is_failure() => {
            let error = update
                .state
                .get("errorMsg")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| update.message.clone())
                .unwrap_or_else(|| "resource reported failure".to_string());
            (update, SyncStatus::Failed { error })
        }
        (Ok(update), None) => (update, SyncStatus::Synced),
    };

    if let SyncStatus::Failed { error } = &status {
        log::warn!("Sync failed for {entity_id}: {error}");
    }

    SyncOutcome {
        entity_id,
        status,
        resource: Some(update.into_resource(log.into_entries(), Utc::now())),
    }
}

fn status_label(status: &SyncStatus) -> String {
    match status {
        SyncStatus::Synced => "synced".to_string(),
        SyncStatus::Failed { error } => format!("failed: {error}"),
        SyncStatus::Skipped { reason } => format!("skipped: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::registry::IntelligenceDefinition;
    use crate::types::{Edge, ResourceHealth, ResourceStatus};
    use std::sync::Mutex;

    /// Runner answering from a fixed script, recording every call
    struct ScriptedRunner {
        outputs: Mutex<Vec<Result<CommandOutput>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(outputs: Vec<Result<CommandOutput>>) -> Self {
            Self {
                outputs: Mutex::new(outputs),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn execute(
            &self,
            command: &str,
            args: &[String],
            _opts: &ExecOptions,
        ) -> Result<CommandOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", command, args.join(" ")));
            let mut outputs = self.outputs.lock().unwrap();
            if outputs.is_empty() {
                Ok(CommandOutput::success(""))
            } else {
                outputs.remove(0)
            }
        }
    }

    fn single(object_type: &str) -> EntityGraph {
        EntityGraph::load(vec![Entity::new("e", object_type, "thing")], vec![]).unwrap()
    }

    fn registry_with(object_type: &str, def: IntelligenceDefinition) -> Registry {
        let mut registry = Registry::new();
        registry.register(object_type, def).unwrap();
        registry
    }

    #[test]
    fn test_success_sets_last_synced_and_logs() {
        let registry = registry_with(
            "thing",
            IntelligenceDefinition::new().with_sync_resource(|_, ctx| {
                let out = ctx.exec("tool", &["check".to_string()])?;
                Ok(ResourceUpdate::new(
                    json!({ "data": out.stdout }),
                    ResourceHealth::Ok,
                    ResourceStatus::Created,
                ))
            }),
        );
        let runner = ScriptedRunner::new(vec![Ok(CommandOutput::success("fine"))]);
        let mut graph = single("thing");

        let outcome = sync_entity(
            &mut graph,
            &registry,
            &runner,
            &"e".into(),
            &EngineOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.status, SyncStatus::Synced);
        let resource = graph.entity(&"e".into()).unwrap().resource.clone().unwrap();
        assert_eq!(resource.state["data"], "fine");
        assert!(resource.last_synced.is_some());
        assert_eq!(resource.logs[0].message, "running command");
        assert_eq!(runner.calls(), vec!["tool check"]);
    }

    #[test]
    fn test_resolver_error_becomes_failed_resource() {
        let registry = registry_with(
            "thing",
            IntelligenceDefinition::new().with_sync_resource(|_, _| anyhow::bail!("no network")),
        );
        let runner = ScriptedRunner::new(vec![]);
        let mut graph = single("thing");
        let outcome = sync_entity(
            &mut graph,
            &registry,
            &runner,
            &"e".into(),
            &EngineOptions::default(),
        )
        .unwrap();

        let resource = outcome.resource.unwrap();
        assert_eq!(resource.health, ResourceHealth::Error);
        assert_eq!(resource.status, ResourceStatus::Failed);
        assert_eq!(resource.state["errorOutput"], "no network");
        assert_eq!(
            outcome.status,
            SyncStatus::Failed {
                error: "no network".into()
            }
        );
    }

    #[test]
    fn test_fatal_entry_fails_sync_and_blocks_commands() {
        let registry = registry_with(
            "thing",
            IntelligenceDefinition::new().with_sync_resource(|_, ctx| {
                let seq = ctx.log().debug("preparing", Value::Null);
                ctx.log().update_payload(seq, "failure", "disk full")?;
                ctx.log().mark_fatal(seq)?;
                // Refused at the checkpoint
                let err = ctx.exec("tool", &[]).unwrap_err();
                assert!(matches!(err, Error::OperationAborted { .. }));
                Ok(ResourceUpdate::new(
                    Value::Null,
                    ResourceHealth::Ok,
                    ResourceStatus::Created,
                ))
            }),
        );
        let runner = ScriptedRunner::new(vec![]);
        let mut graph = single("thing");
        let outcome = sync_entity(
            &mut graph,
            &registry,
            &runner,
            &"e".into(),
            &EngineOptions::default(),
        )
        .unwrap();

        assert_eq!(
            outcome.status,
            SyncStatus::Failed {
                error: "preparing: disk full".into()
            }
        );
        assert!(outcome.resource.unwrap().is_failed());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_staging_released_on_success_and_failure() {
        let staged: std::sync::Arc<Mutex<Vec<std::path::PathBuf>>> = Default::default();
        let seen = staged.clone();
        let registry = registry_with(
            "thing",
            IntelligenceDefinition::new().with_sync_resource(move |req, ctx| {
                let dir = ctx.stage_secret("config.json", b"{}")?.to_path_buf();
                seen.lock().unwrap().push(dir);
                if req.entity.name == "bad" {
                    anyhow::bail!("boom");
                }
                Ok(ResourceUpdate::new(
                    Value::Null,
                    ResourceHealth::Ok,
                    ResourceStatus::Created,
                ))
            }),
        );
        let runner = ScriptedRunner::new(vec![]);
        let mut graph = EntityGraph::load(
            vec![
                Entity::new("a", "thing", "good"),
                Entity::new("b", "thing", "bad"),
            ],
            vec![],
        )
        .unwrap();

        let report = sync_all(
            &mut graph,
            &registry,
            &runner,
            &EngineOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(report.summary().succeeded, 1);
        assert_eq!(report.summary().failed, 1);
        let dirs = staged.lock().unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.iter().all(|d| !d.exists()));
    }

    #[test]
    fn test_spawn_error_folded_into_failed_output() {
        struct Missing;
        impl CommandRunner for Missing {
            fn execute(&self, command: &str, _: &[String], _: &ExecOptions) -> Result<CommandOutput> {
                Err(Error::CommandFailed {
                    command: command.to_string(),
                    exit_code: None,
                    stderr: "not found".to_string(),
                })
            }
        }

        let mut ctx = SyncContext::new(&"e".into(), &Missing, &EngineOptions::default());
        let out = ctx.exec("docker", &[]).unwrap();
        assert!(out.failed);
        assert!(out.stderr.contains("not found"));

        let err = ctx
            .exec_with("docker", &[], &ExecOptions::default().rejecting())
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[test]
    fn test_rejecting_exec_errors_on_nonzero() {
        let runner = ScriptedRunner::new(vec![Ok(CommandOutput::failure(2, "bad flag"))]);
        let mut ctx = SyncContext::new(&"e".into(), &runner, &EngineOptions::default());
        let err = ctx
            .exec_with("tool", &["--x".to_string()], &ExecOptions::default().rejecting())
            .unwrap_err();
        assert_eq!(
            err,
            Error::CommandFailed {
                command: "tool --x".into(),
                exit_code: Some(2),
                stderr: "bad flag".into()
            }
        );
    }

    #[test]
    fn test_entities_without_sync_are_skipped_and_successors_see_upstream() {
        let mut registry = Registry::new();
        registry
            .register("source", IntelligenceDefinition::new())
            .unwrap();
        registry
            .register(
                "upstream",
                IntelligenceDefinition::new().with_sync_resource(|_, _| {
                    Ok(ResourceUpdate::new(
                        json!({ "data": "v1" }),
                        ResourceHealth::Ok,
                        ResourceStatus::Created,
                    ))
                }),
            )
            .unwrap();
        registry
            .register(
                "downstream",
                IntelligenceDefinition::new().with_sync_resource(|req, _| {
                    let upstream = req
                        .predecessors_of_type("upstream")
                        .find_map(|p| p.resource.as_ref())
                        .and_then(|r| r.data().cloned())
                        .unwrap_or(Value::Null);
                    Ok(ResourceUpdate::new(
                        json!({ "data": upstream }),
                        ResourceHealth::Ok,
                        ResourceStatus::Created,
                    ))
                }),
            )
            .unwrap();

        let mut graph = EntityGraph::load(
            vec![
                Entity::new("a", "source", "src"),
                Entity::new("b", "upstream", "up"),
                Entity::new("c", "downstream", "down"),
            ],
            vec![Edge::new("b", "c")],
        )
        .unwrap();
        let report = sync_all(
            &mut graph,
            &registry,
            &ScriptedRunner::new(vec![]),
            &EngineOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert!(matches!(
            report.outcome(&"a".into()).unwrap().status,
            SyncStatus::Skipped { .. }
        ));
        let c = graph.entity(&"c".into()).unwrap();
        assert_eq!(c.resource.as_ref().unwrap().state["data"], "v1");
        assert!(report.is_success());
    }
}
