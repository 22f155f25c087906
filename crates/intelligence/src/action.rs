//! Action dispatcher
//!
//! Dispatching runs the focal entity's action resolver, applies its resource
//! update and then works through the follow-on actions it returned. Pending
//! `(entity, action)` pairs live on an explicit stack, so cascades are
//! processed depth-first without recursion and every node of the resulting
//! plan carries its own state.
//!
//! Follow-on actions may only target direct successors of the entity that
//! requested them. Because the graph is acyclic this bounds every cascade.

use crate::error::{Error, Result};
use crate::eventlog::{EventLog, LogEntry};
use crate::graph::EntityGraph;
use crate::registry::Registry;
use crate::types::{Entity, EntityId, ReconcileSummary, Resource, ResourceUpdate};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input of an action resolver
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub entity: Entity,
    pub predecessors: Vec<Entity>,
    pub successors: Vec<Entity>,
    /// Caller-supplied context, the same for every action of one dispatch
    pub context: Value,
}

impl ActionRequest {
    /// Successors of the given object type
    pub fn successors_of_type<'a>(
        &'a self,
        object_type: &'a str,
    ) -> impl Iterator<Item = &'a Entity> + 'a {
        self.successors
            .iter()
            .filter(move |s| s.object_type == object_type)
    }
}

/// A follow-on action against a successor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeAction {
    pub action: String,
    pub entity_id: EntityId,
}

impl CascadeAction {
    pub fn new(action: &str, entity_id: EntityId) -> Self {
        Self {
            action: action.to_string(),
            entity_id,
        }
    }
}

/// Output of an action resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionReply {
    /// Resource update for the focal entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceUpdate>,
    /// Actions to cascade to successors
    #[serde(default)]
    pub actions: Vec<CascadeAction>,
}

/// Lifecycle of one dispatched action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ActionState {
    Pending,
    Running,
    Succeeded,
    Failed { error: String },
}

/// One dispatched action in a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub entity_id: EntityId,
    pub action: String,
    #[serde(flatten)]
    pub state: ActionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ActionReply>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl ActionNode {
    fn pending(entity_id: EntityId, action: String, parent: Option<usize>) -> Self {
        Self {
            entity_id,
            action,
            state: ActionState::Pending,
            parent,
            children: Vec::new(),
            reply: None,
            logs: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ActionState::Failed { .. })
    }
}

/// Tree of dispatched actions; node 0 is the requested action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPlan {
    pub nodes: Vec<ActionNode>,
}

impl ActionPlan {
    pub fn root(&self) -> Option<&ActionNode> {
        self.nodes.first()
    }

    pub fn node(&self, index: usize) -> Option<&ActionNode> {
        self.nodes.get(index)
    }

    /// Direct cascades of a node, in the order the resolver returned them
    pub fn children(&self, index: usize) -> Vec<&ActionNode> {
        self.nodes
            .get(index)
            .map(|n| n.children.iter().map(|c| &self.nodes[*c]).collect())
            .unwrap_or_default()
    }

    /// Every node dispatched against an entity
    pub fn nodes_for(&self, entity_id: &EntityId) -> Vec<&ActionNode> {
        self.nodes
            .iter()
            .filter(|n| &n.entity_id == entity_id)
            .collect()
    }

    /// `ActionFailed` for every failed node
    pub fn errors(&self) -> Vec<Error> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.state {
                ActionState::Failed { error } => Some(Error::ActionFailed {
                    entity_id: n.entity_id.clone(),
                    cause: error.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for node in &self.nodes {
            match node.state {
                ActionState::Succeeded => summary.succeeded += 1,
                ActionState::Failed { .. } => summary.failed += 1,
                ActionState::Pending | ActionState::Running => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }
}

/// Dispatch an action and every action it cascades to
///
/// Fails up front with `UnknownEntity`, `UnknownObjectType` or
/// `UnknownAction` for the requested action. Failures further down the
/// cascade are recorded on their nodes; sibling branches still run.
pub fn dispatch(
    graph: &mut EntityGraph,
    registry: &Registry,
    entity_id: &EntityId,
    action: &str,
    context: &Value,
) -> Result<ActionPlan> {
    let entity = graph.entity(entity_id)?;
    let definition = registry.lookup(&entity.object_type)?;
    if definition.action(action).is_none() {
        return Err(Error::UnknownAction {
            object_type: entity.object_type.clone(),
            action: action.to_string(),
        });
    }

    let mut plan = ActionPlan {
        nodes: vec![ActionNode::pending(
            entity_id.clone(),
            action.to_string(),
            None,
        )],
    };
    let mut stack = vec![0usize];

    while let Some(index) = stack.pop() {
        plan.nodes[index].state = ActionState::Running;
        let parent = plan.nodes[index]
            .parent
            .map(|p| plan.nodes[p].entity_id.clone());
        let target = plan.nodes[index].entity_id.clone();
        let name = plan.nodes[index].action.clone();
        log::debug!("Dispatching {name} on {target}");

        let mut log = EventLog::new(target.as_str());
        let result = run_action(
            graph,
            registry,
            parent.as_ref(),
            &target,
            &name,
            context,
            &mut log,
        );

        let result = match (result, log.fatal_reason()) {
            (Ok(_), Some(reason)) => Err(reason),
            (other, _) => other,
        };

        match result {
            Ok(reply) => {
                let logs = log.into_entries();
                if let Some(update) = &reply.resource {
                    let resource: Resource = update.clone().into_resource(logs.clone(), Utc::now());
                    graph.entity_mut(&target)?.resource = Some(resource);
                }

                let first_child = plan.nodes.len();
                for cascade in &reply.actions {
                    plan.nodes.push(ActionNode::pending(
                        cascade.entity_id.clone(),
                        cascade.action.clone(),
                        Some(index),
                    ));
                }
                let children: Vec<usize> = (first_child..plan.nodes.len()).collect();
                // Reverse so the first cascade is popped first
                stack.extend(children.iter().rev());

                let node = &mut plan.nodes[index];
                node.children = children;
                node.logs = logs;
                node.reply = Some(reply);
                node.state = ActionState::Succeeded;
            }
            Err(error) => {
                log::warn!("Action {name} failed on {target}: {error}");
                let node = &mut plan.nodes[index];
                node.logs = log.into_entries();
                node.state = ActionState::Failed { error };
            }
        }
    }

    let summary = plan.summary();
    log::info!(
        "Dispatch of {action} on {entity_id}: {} succeeded, {} failed",
        summary.succeeded,
        summary.failed
    );
    Ok(plan)
}

/// Resolve and run one action; errors are rendered for the plan node
fn run_action(
    graph: &EntityGraph,
    registry: &Registry,
    parent: Option<&EntityId>,
    target: &EntityId,
    action: &str,
    context: &Value,
    log: &mut EventLog,
) -> std::result::Result<ActionReply, String> {
    if let Some(parent) = parent
        && !graph.has_edge(parent, target)
    {
        return Err(format!("{target} is not a successor of {parent}"));
    }

    let entity = graph.entity(target).map_err(|e| e.to_string())?;
    let definition = registry
        .lookup(&entity.object_type)
        .map_err(|e| e.to_string())?;
    let resolver = definition.action(action).ok_or_else(|| {
        Error::UnknownAction {
            object_type: entity.object_type.clone(),
            action: action.to_string(),
        }
        .to_string()
    })?;

    let request = ActionRequest {
        action: action.to_string(),
        entity: entity.clone(),
        predecessors: graph
            .predecessors_of(target)
            .map_err(|e| e.to_string())?
            .into_iter()
            .cloned()
            .collect(),
        successors: graph
            .successors_of(target)
            .map_err(|e| e.to_string())?
            .into_iter()
            .cloned()
            .collect(),
        context: context.clone(),
    };

    resolver(&request, log).map_err(|e| format!("{e:#}"))
}
