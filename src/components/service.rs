//! `service` - a deployable application
//!
//! Services have no inference or sync of their own. Deploying one records
//! who deployed it and fans the deploy out to downstream services.

use anyhow::Result;
use intelligence::{
    ActionReply, ActionRequest, CascadeAction, EventLog, IntelligenceDefinition, ResourceHealth,
    ResourceStatus, ResourceUpdate,
};
use serde_json::json;

pub const OBJECT_TYPE: &str = "service";

pub fn definition() -> IntelligenceDefinition {
    IntelligenceDefinition::new().with_action("deploy", deploy)
}

/// Mark the entity deployed and cascade `deploy` to successor services
///
/// Shared with `dockerImage`, which deploys the same way.
pub fn deploy(request: &ActionRequest, log: &mut EventLog) -> Result<ActionReply> {
    let deployed_by: Vec<&str> = request
        .predecessors
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    let actions: Vec<CascadeAction> = request
        .successors_of_type(OBJECT_TYPE)
        .map(|s| CascadeAction::new("deploy", s.id.clone()))
        .collect();

    log.info(
        "deploying",
        json!({
            "name": request.entity.name,
            "context": request.context,
            "cascades": actions.iter().map(|a| a.entity_id.as_str()).collect::<Vec<_>>(),
        }),
    );

    Ok(ActionReply {
        resource: Some(ResourceUpdate::new(
            json!({ "deployedBy": deployed_by }),
            ResourceHealth::Ok,
            ResourceStatus::Created,
        )),
        actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelligence::Entity;

    #[test]
    fn test_deploy_cascades_only_to_services() {
        let request = ActionRequest {
            action: "deploy".to_string(),
            entity: Entity::new("svc", OBJECT_TYPE, "api"),
            predecessors: vec![Entity::new("img", "dockerImage", "api-image")],
            successors: vec![
                Entity::new("web", OBJECT_TYPE, "web"),
                Entity::new("other", "dockerImage", "x"),
            ],
            context: json!({ "ticket": "OPS-7" }),
        };
        let mut log = EventLog::new("svc");
        let reply = deploy(&request, &mut log).unwrap();

        assert_eq!(reply.actions, vec![CascadeAction::new("deploy", "web".into())]);
        let resource = reply.resource.unwrap();
        assert_eq!(resource.state["deployedBy"], json!(["api-image"]));
        assert_eq!(resource.health, ResourceHealth::Ok);
        assert_eq!(resource.status, ResourceStatus::Created);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].payload["context"]["ticket"], "OPS-7");
    }
}
