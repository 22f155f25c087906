//! `dockerHubCredential` - a data-only entity holding registry credentials
//!
//! The credential has no resolvers of its own. Downstream `dockerImage`
//! entities read its decrypted baseline properties and stage them as a
//! Docker CLI config for the duration of one sync.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use intelligence::{Entity, IntelligenceDefinition};
use serde::Deserialize;
use serde_json::json;
use std::fmt;

pub const OBJECT_TYPE: &str = "dockerHubCredential";

/// Registry key Docker uses for Docker Hub auth entries
pub const DOCKER_HUB_REGISTRY: &str = "https://index.docker.io/v1/";

/// File name the Docker CLI reads from its `--config` directory
pub const DOCKER_CONFIG_FILE: &str = "config.json";

pub fn definition() -> IntelligenceDefinition {
    IntelligenceDefinition::new()
}

/// Decrypted Docker Hub login
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read the `decrypted` baseline property of a credential entity
    pub fn from_entity(entity: &Entity) -> Result<Self> {
        let decrypted = entity
            .properties
            .get("decrypted")
            .with_context(|| format!("{} has no decrypted credentials", entity.name))?;
        serde_json::from_value(decrypted.clone())
            .with_context(|| format!("{} has malformed decrypted credentials", entity.name))
    }

    /// Base64 of `username:password`
    pub fn auth(&self) -> String {
        BASE64.encode(format!("{}:{}", self.username, self.password))
    }

    /// Contents of a Docker CLI `config.json` authenticating to Docker Hub
    pub fn docker_config(&self) -> Result<Vec<u8>> {
        let config = json!({
            "auths": {
                DOCKER_HUB_REGISTRY: { "auth": self.auth() }
            }
        });
        serde_json::to_vec(&config).context("Failed to serialize docker config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn credential() -> Entity {
        Entity::new("cred", OBJECT_TYPE, "hub").with_property(
            "decrypted",
            json!({ "username": "alice", "password": "s3cret" }),
        )
    }

    #[test]
    fn test_docker_config_has_base64_auth() {
        let creds = Credentials::from_entity(&credential()).unwrap();
        let config: Value = serde_json::from_slice(&creds.docker_config().unwrap()).unwrap();
        assert_eq!(
            config["auths"][DOCKER_HUB_REGISTRY]["auth"],
            "YWxpY2U6czNjcmV0"
        );
    }

    #[test]
    fn test_missing_decrypted_is_an_error() {
        let entity = Entity::new("cred", OBJECT_TYPE, "hub");
        let err = Credentials::from_entity(&entity).unwrap_err();
        assert!(err.to_string().contains("no decrypted credentials"));
    }

    #[test]
    fn test_malformed_decrypted_is_an_error() {
        let entity =
            Entity::new("cred", OBJECT_TYPE, "hub").with_property("decrypted", json!({"user": 1}));
        assert!(Credentials::from_entity(&entity).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::from_entity(&credential()).unwrap();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("s3cret"));
    }
}
