//! # Intelligence
//!
//! A reconciliation engine for graphs of infrastructure entities.
//!
//! Each object type registers an *intelligence definition*: optional
//! resolvers that infer derived properties, synchronize the real-world
//! resource, and run named actions. The engine drives those resolvers over a
//! validated entity DAG.
//!
//! ## Core Concepts
//!
//! - **Registry**: object type -> [`IntelligenceDefinition`], frozen after startup
//! - **EntityGraph**: validated DAG with topological order and layers
//! - **Inference**: [`infer`] fills every entity's inferred property scope
//! - **Sync**: [`sync_entity`] / [`sync_all`] reduce resolver output to a [`Resource`]
//! - **Dispatch**: [`dispatch`] runs an action and its cascades into an [`ActionPlan`]
//! - **EventLog**: one structured log stream per sync or dispatch operation
//!
//! ## Example
//!
//! ```ignore
//! use intelligence::{
//!     EngineOptions, Entity, Edge, EntityGraph, IntelligenceDefinition, NoProgress,
//!     PropertySet, Registry, infer,
//! };
//!
//! let mut registry = Registry::new();
//! registry.register("service", IntelligenceDefinition::new())?;
//! registry.register(
//!     "dockerImage",
//!     IntelligenceDefinition::new().with_calculate_properties(|req| {
//!         let mut inferred = PropertySet::new();
//!         for pred in req.predecessors_of_type("service") {
//!             inferred.set("image", pred.name.clone());
//!         }
//!         Ok(inferred)
//!     }),
//! )?;
//! let registry = registry.freeze();
//!
//! let mut graph = EntityGraph::load(
//!     vec![Entity::new("a", "service", "web"), Entity::new("b", "dockerImage", "img")],
//!     vec![Edge::new("a", "b")],
//! )?;
//! let report = infer(&mut graph, &registry, &EngineOptions::default(), &mut NoProgress)?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandRunner`]: runs external commands for sync resolvers
//! - [`ProgressCallback`]: receives per-layer progress updates
//!
//! The engine itself never spawns processes or writes to the terminal.

pub mod action;
pub mod context;
pub mod error;
pub mod eventlog;
pub mod graph;
pub mod inference;
pub mod registry;
pub mod staging;
pub mod sync;
pub mod types;

// Re-export main types at crate root
pub use action::{
    ActionNode, ActionPlan, ActionReply, ActionRequest, ActionState, CascadeAction, dispatch,
};
pub use context::{CommandRunner, NoProgress, ProgressCallback};
pub use error::{Error, Result};
pub use eventlog::{EventLog, LogEntry, LogLevel};
pub use graph::{EntityGraph, TopologicalOrder};
pub use inference::{
    CalculatePropertiesRequest, InferenceOutcome, InferenceReport, blocked_ids, infer,
};
pub use registry::{
    ActionFn, CalculatePropertiesFn, IntelligenceDefinition, Registry, SyncResourceFn,
};
pub use staging::StagingArea;
pub use sync::{
    SyncContext, SyncOutcome, SyncReport, SyncResourceRequest, SyncStatus, sync_all, sync_entity,
};
pub use types::{
    BASELINE, CommandOutput, Edge, EngineOptions, Entity, EntityId, ExecOptions, GraphSnapshot,
    Properties, PropertySet, ReconcileSummary, Resource, ResourceHealth, ResourceStatus,
    ResourceUpdate,
};
