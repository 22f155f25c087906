//! Error types for the intelligence engine.
//!
//! Errors fall in two groups. Structural errors (registration, graph shape,
//! unknown types/actions) are precondition violations and are returned to the
//! caller before any work starts. Per-entity errors (`InferenceFailed`,
//! `SyncFailed`, `ActionFailed`) are recorded in the owning report and never
//! abort unrelated parts of a pass.

use crate::types::EntityId;
use thiserror::Error;

/// Errors that can occur while registering, loading or reconciling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An intelligence definition already exists for this object type
    #[error("object type already registered: {0}")]
    DuplicateRegistration(String),

    /// No intelligence definition is registered for this object type
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    /// The edge set contains a cycle
    #[error("cycle detected: {}", format_path(.path))]
    CycleDetected {
        /// Entity ids along the cycle, first id repeated at the end
        path: Vec<EntityId>,
    },

    /// An edge references an entity that is not in the snapshot
    #[error("dangling edge {from} -> {to}: unknown entity {missing}")]
    DanglingEdge {
        from: EntityId,
        to: EntityId,
        missing: EntityId,
    },

    /// Two entities in a snapshot share an id
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(EntityId),

    /// The entity is not part of the loaded graph
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// The object type does not expose the requested action
    #[error("unknown action '{action}' for object type {object_type}")]
    UnknownAction { object_type: String, action: String },

    /// A calculateProperties resolver failed
    #[error("property inference failed for {entity_id}: {cause}")]
    InferenceFailed { entity_id: EntityId, cause: String },

    /// A syncResource resolver failed or logged a fatal entry
    #[error("resource sync failed for {entity_id}: {cause}")]
    SyncFailed { entity_id: EntityId, cause: String },

    /// An action resolver failed, or a cascade could not be dispatched
    #[error("action failed for {entity_id}: {cause}")]
    ActionFailed { entity_id: EntityId, cause: String },

    /// No entry with this sequence number in the operation log
    #[error("unknown log entry: {0}")]
    UnknownLogEntry(u64),

    /// A fatal log entry was recorded; further work for the entity is refused
    #[error("operation aborted by fatal log entry {entry}")]
    OperationAborted { entry: u64 },

    /// A command exited non-zero while `reject_on_nonzero` was set
    #[error("command failed: {command} (exit {}): {stderr}", format_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl Error {
    /// Whether this error is a precondition violation rather than a
    /// per-entity runtime failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration(_)
                | Self::UnknownObjectType(_)
                | Self::CycleDetected { .. }
                | Self::DanglingEdge { .. }
                | Self::DuplicateEntity(_)
                | Self::UnknownEntity(_)
                | Self::UnknownAction { .. }
        )
    }

    /// The entity a per-entity error is attached to.
    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::InferenceFailed { entity_id, .. }
            | Self::SyncFailed { entity_id, .. }
            | Self::ActionFailed { entity_id, .. } => Some(entity_id),
            _ => None,
        }
    }
}

fn format_path(path: &[EntityId]) -> String {
    path.iter()
        .map(EntityId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(Error::DuplicateRegistration("service".into()).is_structural());
        assert!(Error::CycleDetected { path: vec![] }.is_structural());
        assert!(
            !Error::SyncFailed {
                entity_id: "a".into(),
                cause: "boom".into()
            }
            .is_structural()
        );
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cycle detected: a -> b -> a");
    }

    #[test]
    fn test_entity_id_for_runtime_errors() {
        let err = Error::ActionFailed {
            entity_id: "x".into(),
            cause: "nope".into(),
        };
        assert_eq!(err.entity_id().map(EntityId::as_str), Some("x"));
        assert!(Error::UnknownObjectType("t".into()).entity_id().is_none());
    }

    #[test]
    fn test_command_failed_without_exit_code() {
        let err = Error::CommandFailed {
            command: "docker image pull web".into(),
            exit_code: None,
            stderr: "timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "command failed: docker image pull web (exit none): timed out"
        );
    }
}
