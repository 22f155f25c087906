//! Built-in component intelligence

pub mod docker_hub_credential;
pub mod docker_image;
pub mod service;

use anyhow::Result;
use intelligence::Registry;
use std::sync::Arc;

/// Register every built-in object type and freeze the registry
pub fn registry(docker_binary: &str) -> Result<Arc<Registry>> {
    let mut registry = Registry::new();
    registry.register(service::OBJECT_TYPE, service::definition())?;
    registry.register(docker_image::OBJECT_TYPE, docker_image::definition(docker_binary))?;
    registry.register(
        docker_hub_credential::OBJECT_TYPE,
        docker_hub_credential::definition(),
    )?;
    Ok(registry.freeze())
}
