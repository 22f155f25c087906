//! `dockerImage` - a container image pulled onto the local Docker host
//!
//! - inference names the image after its upstream `service`
//! - sync pulls the image, then inspects it to capture the local record
//! - `deploy` behaves like a service deploy

use super::docker_hub_credential::{self, Credentials, DOCKER_CONFIG_FILE};
use super::service;
use anyhow::{Context, Result};
use intelligence::{
    CalculatePropertiesRequest, IntelligenceDefinition, PropertySet, ResourceHealth,
    ResourceStatus, ResourceUpdate, SyncContext, SyncResourceRequest,
};
use serde_json::{Value, json};
use std::path::PathBuf;

pub const OBJECT_TYPE: &str = "dockerImage";

/// Definition running the given docker binary
pub fn definition(docker: &str) -> IntelligenceDefinition {
    let docker = docker.to_string();
    IntelligenceDefinition::new()
        .with_calculate_properties(calculate_properties)
        .with_sync_resource(move |request, ctx| sync_resource(&docker, request, ctx))
        .with_action("deploy", service::deploy)
}

/// Copy the name of a predecessor service into the baseline `image`
pub fn calculate_properties(request: &CalculatePropertiesRequest) -> Result<PropertySet> {
    let mut inferred = PropertySet::new();
    for pred in request.predecessors_of_type(service::OBJECT_TYPE) {
        inferred.set("image", pred.name.clone());
    }
    Ok(inferred)
}

/// Pull then inspect the image
pub fn sync_resource(
    docker: &str,
    request: &SyncResourceRequest,
    ctx: &mut SyncContext<'_>,
) -> Result<ResourceUpdate> {
    let image = request
        .entity
        .properties
        .get_str("image")
        .with_context(|| format!("{} has no image property", request.entity.name))?
        .to_string();

    let config_dir = stage_credentials(request, ctx)?;

    let mut base_args = Vec::new();
    if let Some(dir) = &config_dir {
        base_args.push("--config".to_string());
        base_args.push(dir.display().to_string());
    }
    let command_args = |verb: &str| {
        let mut args = base_args.clone();
        args.extend(["image".to_string(), verb.to_string(), image.clone()]);
        args
    };

    let pull = ctx.exec(docker, &command_args("pull"))?;
    if pull.failed {
        return Ok(ResourceUpdate::failed(
            request.previous_data(),
            "docker image pull command failed",
            &pull.stderr,
        ));
    }

    let inspect = ctx.exec(docker, &command_args("inspect"))?;
    if inspect.failed {
        return Ok(ResourceUpdate::failed(
            request.previous_data(),
            "docker image inspect command failed",
            &inspect.stderr,
        ));
    }

    match first_record(&inspect.stdout) {
        Ok(record) => Ok(ResourceUpdate::new(
            json!({ "data": record }),
            ResourceHealth::Ok,
            ResourceStatus::Created,
        )),
        Err(e) => {
            ctx.log().warn(
                "unparseable inspect output",
                json!({ "failure": format!("{e:#}") }),
            );
            Ok(ResourceUpdate::failed(
                request.previous_data(),
                "docker image inspect output could not be parsed",
                &format!("{e:#}"),
            ))
        }
    }
}

/// Stage Docker Hub auth from the first credential predecessor
///
/// A staging failure is recorded as a fatal log entry; the next command
/// then refuses to run and the sync fails.
fn stage_credentials(
    request: &SyncResourceRequest,
    ctx: &mut SyncContext<'_>,
) -> Result<Option<PathBuf>> {
    let Some(pred) = request
        .predecessors_of_type(docker_hub_credential::OBJECT_TYPE)
        .next()
    else {
        return Ok(None);
    };
    let seq = ctx
        .log()
        .debug("using docker hub credential", json!({ "name": pred.name }));

    let result = Credentials::from_entity(pred)
        .and_then(|creds| creds.docker_config())
        .and_then(|config| {
            ctx.stage_secret(DOCKER_CONFIG_FILE, &config)
                .map(|dir| dir.to_path_buf())
        });

    match result {
        Ok(dir) => Ok(Some(dir)),
        Err(e) => {
            let log = ctx.log();
            log.update_payload(seq, "failure", format!("{e:#}"))?;
            log.mark_fatal(seq)?;
            Ok(None)
        }
    }
}

/// First element of `docker image inspect` JSON output
fn first_record(stdout: &str) -> Result<Value> {
    let parsed: Value = serde_json::from_str(stdout).context("inspect output is not JSON")?;
    parsed
        .as_array()
        .and_then(|records| records.first())
        .cloned()
        .context("inspect output contains no image record")
}
