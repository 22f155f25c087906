//! Property inference - derive each entity's inferred scope from upstream
//!
//! Entities are visited layer by layer in topological order, so every
//! resolver sees its predecessors' already-inferred properties. Resolvers of
//! one layer run in parallel; their results are written back before the next
//! layer starts.

use crate::context::ProgressCallback;
use crate::error::Error;
use crate::graph::EntityGraph;
use crate::registry::Registry;
use crate::types::{Entity, EntityId, EngineOptions, PropertySet, ReconcileSummary};
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Input of a calculateProperties resolver
#[derive(Debug, Clone)]
pub struct CalculatePropertiesRequest {
    pub entity: Entity,
    /// Direct predecessors with their current properties
    pub predecessors: Vec<Entity>,
}

impl CalculatePropertiesRequest {
    /// Predecessors of the given object type
    pub fn predecessors_of_type<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a Entity> + 'a {
        self.predecessors
            .iter()
            .filter(move |p| p.object_type == object_type)
    }
}

/// What happened to one entity during inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum InferenceOutcome {
    /// The resolver ran and its inferred scope was stored
    Inferred,
    /// No calculateProperties resolver; properties left as they were
    Unchanged,
    /// The resolver failed
    Failed { error: String },
    /// Not attempted because an upstream entity failed
    Blocked { by: EntityId },
}

/// Per-entity results of an inference pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceReport {
    pub outcomes: BTreeMap<EntityId, InferenceOutcome>,
}

impl InferenceReport {
    pub fn outcome(&self, id: &EntityId) -> Option<&InferenceOutcome> {
        self.outcomes.get(id)
    }

    /// `InferenceFailed` for every failed entity
    pub fn errors(&self) -> Vec<Error> {
        self.outcomes
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                InferenceOutcome::Failed { error } => Some(Error::InferenceFailed {
                    entity_id: id.clone(),
                    cause: error.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for outcome in self.outcomes.values() {
            match outcome {
                InferenceOutcome::Inferred => summary.succeeded += 1,
                InferenceOutcome::Unchanged => summary.unchanged += 1,
                InferenceOutcome::Failed { .. } => summary.failed += 1,
                InferenceOutcome::Blocked { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

/// Run inference over the whole graph
///
/// Structural errors (an entity whose object type has no registered
/// intelligence) are returned before any resolver runs.
pub fn infer<P: ProgressCallback>(
    graph: &mut EntityGraph,
    registry: &Registry,
    opts: &EngineOptions,
    progress: &mut P,
) -> crate::Result<InferenceReport> {
    for entity in graph.entities() {
        registry.lookup(&entity.object_type)?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::InferenceFailed {
            entity_id: EntityId::new("*"),
            cause: format!("failed to create thread pool: {e}"),
        })?;

    let mut report = InferenceReport::default();
    // Entity id -> upstream entity whose failure blocks it
    let mut blocked: BTreeMap<EntityId, EntityId> = BTreeMap::new();

    for layer in graph.layers() {
        progress.on_layer_start(layer.len());

        let mut requests = Vec::new();
        for id in &layer {
            if let Some(by) = blocked.get(id) {
                let outcome = InferenceOutcome::Blocked { by: by.clone() };
                progress.on_entity_complete(id, &outcome_label(&outcome));
                report.outcomes.insert(id.clone(), outcome);
                continue;
            }
            let entity = graph.entity(id)?;
            let definition = registry.lookup(&entity.object_type)?;
            match &definition.calculate_properties {
                Some(resolver) => {
                    let predecessors = graph
                        .predecessors_of(id)?
                        .into_iter()
                        .cloned()
                        .collect();
                    requests.push((
                        resolver.clone(),
                        CalculatePropertiesRequest {
                            entity: entity.clone(),
                            predecessors,
                        },
                    ));
                }
                None => {
                    progress.on_entity_complete(id, "unchanged");
                    report
                        .outcomes
                        .insert(id.clone(), InferenceOutcome::Unchanged);
                }
            }
        }

        let results: Vec<(EntityId, Result<PropertySet>)> = pool.install(|| {
            requests
                .par_iter()
                .map(|(resolver, request)| (request.entity.id.clone(), resolver(request)))
                .collect()
        });

        for (id, result) in results {
            let outcome = match result {
                Ok(inferred) => {
                    graph.entity_mut(&id)?.properties.inferred = inferred;
                    InferenceOutcome::Inferred
                }
                Err(e) => {
                    log::warn!("Property inference failed for {id}: {e:#}");
                    for descendant in graph.descendants_of(&id)? {
                        blocked.entry(descendant).or_insert_with(|| id.clone());
                    }
                    InferenceOutcome::Failed {
                        error: format!("{e:#}"),
                    }
                }
            };
            progress.on_entity_complete(&id, &outcome_label(&outcome));
            report.outcomes.insert(id, outcome);
        }

        progress.on_layer_complete();
    }

    let summary = report.summary();
    log::info!(
        "Inference complete: {} inferred, {} unchanged, {} failed, {} blocked",
        summary.succeeded,
        summary.unchanged,
        summary.failed,
        summary.skipped
    );
    Ok(report)
}

/// Entities that failed or were blocked, for callers that filter later passes
pub fn blocked_ids(report: &InferenceReport) -> BTreeSet<EntityId> {
    report
        .outcomes
        .iter()
        .filter(|(_, o)| matches!(o, InferenceOutcome::Failed { .. } | InferenceOutcome::Blocked { .. }))
        .map(|(id, _)| id.clone())
        .collect()
}

fn outcome_label(outcome: &InferenceOutcome) -> String {
    match outcome {
        InferenceOutcome::Inferred => "inferred".to_string(),
        InferenceOutcome::Unchanged => "unchanged".to_string(),
        InferenceOutcome::Failed { error } => format!("failed: {error}"),
        InferenceOutcome::Blocked { by } => format!("blocked by {by}"),
    }
}
