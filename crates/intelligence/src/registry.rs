//! Registry of per-object-type intelligence
//!
//! Definitions are registered once at startup. The registry is then shared
//! behind an `Arc` and only read, so lookups need no locking.

use crate::action::{ActionReply, ActionRequest};
use crate::error::{Error, Result};
use crate::eventlog::EventLog;
use crate::inference::CalculatePropertiesRequest;
use crate::sync::{SyncContext, SyncResourceRequest};
use crate::types::{PropertySet, ResourceUpdate};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Resolver computing the inferred property scope of an entity
pub type CalculatePropertiesFn =
    Arc<dyn Fn(&CalculatePropertiesRequest) -> anyhow::Result<PropertySet> + Send + Sync>;

/// Resolver synchronizing an entity with its real-world resource
pub type SyncResourceFn = Arc<
    dyn Fn(&SyncResourceRequest, &mut SyncContext<'_>) -> anyhow::Result<ResourceUpdate>
        + Send
        + Sync,
>;

/// Resolver for one named action
pub type ActionFn =
    Arc<dyn Fn(&ActionRequest, &mut EventLog) -> anyhow::Result<ActionReply> + Send + Sync>;

/// Capability set registered for one object type
#[derive(Clone, Default)]
pub struct IntelligenceDefinition {
    pub calculate_properties: Option<CalculatePropertiesFn>,
    pub sync_resource: Option<SyncResourceFn>,
    pub actions: BTreeMap<String, ActionFn>,
}

impl IntelligenceDefinition {
    /// A definition with no resolvers
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_calculate_properties<F>(mut self, f: F) -> Self
    where
        F: Fn(&CalculatePropertiesRequest) -> anyhow::Result<PropertySet> + Send + Sync + 'static,
    {
        self.calculate_properties = Some(Arc::new(f));
        self
    }

    pub fn with_sync_resource<F>(mut self, f: F) -> Self
    where
        F: Fn(&SyncResourceRequest, &mut SyncContext<'_>) -> anyhow::Result<ResourceUpdate>
            + Send
            + Sync
            + 'static,
    {
        self.sync_resource = Some(Arc::new(f));
        self
    }

    pub fn with_action<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&ActionRequest, &mut EventLog) -> anyhow::Result<ActionReply> + Send + Sync + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(f));
        self
    }

    /// Look up an action resolver
    pub fn action(&self, name: &str) -> Option<&ActionFn> {
        self.actions.get(name)
    }

    /// Names of all registered actions, sorted
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for IntelligenceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntelligenceDefinition")
            .field("calculate_properties", &self.calculate_properties.is_some())
            .field("sync_resource", &self.sync_resource.is_some())
            .field("actions", &self.action_names())
            .finish()
    }
}

/// Mapping from object type to its intelligence
#[derive(Debug, Default)]
pub struct Registry {
    definitions: HashMap<String, IntelligenceDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition; each object type may be registered once
    pub fn register(
        &mut self,
        object_type: &str,
        definition: IntelligenceDefinition,
    ) -> Result<()> {
        if self.definitions.contains_key(object_type) {
            return Err(Error::DuplicateRegistration(object_type.to_string()));
        }
        log::debug!("Registered intelligence for {object_type}: {definition:?}");
        self.definitions
            .insert(object_type.to_string(), definition);
        Ok(())
    }

    /// Look up the definition of an object type
    pub fn lookup(&self, object_type: &str) -> Result<&IntelligenceDefinition> {
        self.definitions
            .get(object_type)
            .ok_or_else(|| Error::UnknownObjectType(object_type.to_string()))
    }

    pub fn contains(&self, object_type: &str) -> bool {
        self.definitions.contains_key(object_type)
    }

    /// Registered object types, sorted
    pub fn object_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Finish registration and share the registry read-only
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}
