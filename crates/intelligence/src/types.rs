//! Core data model for resource intelligence

use crate::eventlog::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Property system every object type reads and writes by default
pub const BASELINE: &str = "__baseline";

/// Stable identifier of an entity within a snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Properties for one scope, keyed by system name (usually [`BASELINE`])
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertySet(BTreeMap<String, Map<String, Value>>);

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties of the baseline system, if any were set
    pub fn baseline(&self) -> Option<&Map<String, Value>> {
        self.0.get(BASELINE)
    }

    /// Mutable baseline properties, created on first use
    pub fn baseline_mut(&mut self) -> &mut Map<String, Value> {
        self.system_mut(BASELINE)
    }

    pub fn system(&self, system: &str) -> Option<&Map<String, Value>> {
        self.0.get(system)
    }

    pub fn system_mut(&mut self, system: &str) -> &mut Map<String, Value> {
        self.0.entry(system.to_string()).or_default()
    }

    /// Look up a baseline key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.baseline().and_then(|b| b.get(key))
    }

    /// Set a baseline key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.baseline_mut().insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Map::is_empty)
    }
}

/// Scoped property bags of an entity
///
/// Inference only ever replaces `inferred`. `explicit` holds values set by
/// editors outside the engine and `diff` holds their pending changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "PropertySet::is_empty")]
    pub inferred: PropertySet,
    #[serde(default, skip_serializing_if = "PropertySet::is_empty")]
    pub explicit: PropertySet,
    #[serde(default, skip_serializing_if = "PropertySet::is_empty")]
    pub diff: PropertySet,
}

impl Properties {
    /// Resolve a baseline key, explicit values winning over inferred ones
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.explicit.get(key).or_else(|| self.inferred.get(key))
    }

    /// Resolve a baseline key as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

/// A modeled infrastructure object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub object_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Properties,
    /// Last synchronized resource, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, object_type: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.to_string(),
            name: name.to_string(),
            properties: Properties::default(),
            resource: None,
        }
    }

    /// Set an explicit baseline property
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.explicit.set(key, value);
        self
    }
}

/// Directed predecessor -> successor relation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: EntityId,
    pub to: EntityId,
}

impl Edge {
    pub fn new(from: impl Into<EntityId>, to: impl Into<EntityId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Entities plus edges as exchanged with the persistence collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Health of a synchronized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceHealth {
    Ok,
    Warning,
    Error,
    #[default]
    Unknown,
}

/// Lifecycle status of a synchronized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceStatus {
    #[default]
    Pending,
    InProgress,
    Created,
    Failed,
    Deleted,
}

impl ResourceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Real-world state snapshot for an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub health: ResourceHealth,
    #[serde(default)]
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

impl Resource {
    /// Previous `state.data`, carried forward on failures
    pub fn data(&self) -> Option<&Value> {
        self.state.get("data")
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failure()
    }
}

/// Resource fields a resolver decides; the engine adds logs and timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    pub state: Value,
    pub health: ResourceHealth,
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResourceUpdate {
    pub fn new(state: Value, health: ResourceHealth, status: ResourceStatus) -> Self {
        Self {
            state,
            health,
            status,
            message: None,
        }
    }

    /// A failed update carrying the diagnostic `errorMsg`/`errorOutput` fields
    pub fn failed(previous_data: Option<&Value>, error_msg: &str, error_output: &str) -> Self {
        let state = serde_json::json!({
            "data": previous_data.cloned().unwrap_or(Value::Null),
            "errorMsg": error_msg,
            "errorOutput": error_output,
        });
        Self {
            state,
            health: ResourceHealth::Error,
            status: ResourceStatus::Failed,
            message: Some(error_msg.to_string()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Finish the update into a resource record
    pub fn into_resource(self, logs: Vec<LogEntry>, synced_at: DateTime<Utc>) -> Resource {
        Resource {
            state: self.state,
            health: self.health,
            status: self.status,
            message: self.message,
            logs,
            last_synced: Some(synced_at),
        }
    }
}

/// Options for one external command invocation
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Kill the command after this long; treated like a non-zero exit
    pub timeout: Option<Duration>,
    /// Return an error instead of a failed output on non-zero exit
    pub reject_on_nonzero: bool,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_on_nonzero = true;
        self
    }
}

/// Output from an external command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub failed: bool,
    #[serde(default)]
    pub timed_out: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            failed: false,
            timed_out: false,
        }
    }

    /// Failed output with an exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
            failed: true,
            timed_out: false,
        }
    }

    /// Output for a command killed at its deadline
    pub fn timeout(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: None,
            stdout,
            stderr,
            failed: true,
            timed_out: true,
        }
    }
}

/// Options shared by inference and sync passes
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Parallel workers per topological layer
    pub jobs: usize,
    /// Default timeout for commands run through a sync context
    pub command_timeout: Option<Duration>,
    /// Prefix of temporary credential staging directories
    pub staging_prefix: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            command_timeout: Some(Duration::from_secs(300)),
            staging_prefix: "veritech-".to_string(),
        }
    }
}

/// Per-entity outcome counts of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    /// Total number of entities touched
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.unchanged
    }

    /// Check if the pass had no failures
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.unchanged += other.unchanged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_overrides_inferred() {
        let mut props = Properties::default();
        props.inferred.set("image", "web");
        assert_eq!(props.get_str("image"), Some("web"));

        props.explicit.set("image", "nginx");
        assert_eq!(props.get_str("image"), Some("nginx"));
    }

    #[test]
    fn test_entity_wire_format_is_camel_case() {
        let entity = Entity::new("e1", "dockerImage", "img");
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["objectType"], "dockerImage");
        assert!(value.get("resource").is_none());
    }

    #[test]
    fn test_failed_update_keeps_previous_data() {
        let previous = json!({"Id": "sha256:abc"});
        let update = ResourceUpdate::failed(Some(&previous), "pull failed", "denied");
        assert_eq!(update.health, ResourceHealth::Error);
        assert_eq!(update.status, ResourceStatus::Failed);
        assert_eq!(update.state["data"], previous);
        assert_eq!(update.state["errorOutput"], "denied");
    }

    #[test]
    fn test_health_and_status_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ResourceStatus::InProgress).unwrap(),
            json!("inProgress")
        );
        assert_eq!(serde_json::to_value(ResourceHealth::Ok).unwrap(), json!("ok"));
    }

    #[test]
    fn test_summary_merge() {
        let mut a = ReconcileSummary {
            succeeded: 2,
            failed: 1,
            ..Default::default()
        };
        a.merge(&ReconcileSummary {
            skipped: 3,
            unchanged: 1,
            ..Default::default()
        });
        assert_eq!(a.total(), 7);
        assert!(!a.is_success());
    }
}
