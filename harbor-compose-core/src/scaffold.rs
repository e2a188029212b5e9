//! Starter compose files for `harbor-compose init`.

use std::collections::BTreeMap;

use crate::compose::{
    ComposeShipment, DockerCompose, DockerComposeService, HEALTHCHECK_VAR, HarborCompose, PORT_VAR,
};
use crate::error::{HarborComposeError, Result};

/// Answers collected by `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// Shipment name.
    pub name: String,
    /// Environment name.
    pub env: String,
    /// Barge to deploy to.
    pub barge: String,
    /// Owning group.
    pub group: String,
    /// Replica count.
    pub replicas: u32,
    /// Container image; defaults to `<name>:0.1.0`.
    pub image: Option<String>,
    /// Port the container listens on.
    pub port: u16,
    /// Health check path.
    pub healthcheck: String,
    /// Property metadata.
    pub property: String,
    /// Project metadata.
    pub project: String,
    /// Product metadata.
    pub product: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            env: "dev".to_string(),
            barge: String::new(),
            group: String::new(),
            replicas: 2,
            image: None,
            port: 80,
            healthcheck: "/health".to_string(),
            property: String::new(),
            project: String::new(),
            product: String::new(),
        }
    }
}

/// Build a single-container docker-compose and harbor-compose pair.
pub fn scaffold(options: &InitOptions) -> Result<(DockerCompose, HarborCompose)> {
    for (field, value) in [
        ("name", &options.name),
        ("env", &options.env),
        ("barge", &options.barge),
        ("group", &options.group),
    ] {
        if value.trim().is_empty() {
            return Err(HarborComposeError::validation(format!("{field} is required")));
        }
    }
    if options.port == 0 {
        return Err(HarborComposeError::validation("port must be non-zero"));
    }

    let image = options
        .image
        .clone()
        .unwrap_or_else(|| format!("{}:0.1.0", options.name));
    let mut docker_compose = DockerCompose::default();
    docker_compose.services.insert(
        options.name.clone(),
        DockerComposeService {
            build: Some(".".to_string()),
            image,
            ports: vec![format!("80:{}", options.port)],
            environment: BTreeMap::from([
                (HEALTHCHECK_VAR.to_string(), options.healthcheck.clone()),
                (PORT_VAR.to_string(), options.port.to_string()),
            ]),
            env_file: Vec::new(),
        },
    );

    let mut harbor_compose = HarborCompose::default();
    harbor_compose.shipments.insert(
        options.name.clone(),
        ComposeShipment {
            env: options.env.clone(),
            barge: options.barge.clone(),
            containers: vec![options.name.clone()],
            replicas: options.replicas,
            group: options.group.clone(),
            property: options.property.clone(),
            project: options.project.clone(),
            product: options.product.clone(),
            enable_monitoring: Some(true),
            ..ComposeShipment::default()
        },
    );
    Ok((docker_compose, harbor_compose))
}
