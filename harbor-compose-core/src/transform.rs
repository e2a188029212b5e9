//! Conversion between platform shipments and compose files.

use std::collections::BTreeMap;

use crate::compose::{
    ComposeShipment, DockerCompose, DockerComposeService, HEALTHCHECK_VAR, HIDDEN_ENV_FILE,
    HarborCompose, PORT_VAR,
};
use crate::envvars::{ClassifiedEnvVars, is_restart_marker, unescape_dollars};
use crate::error::{HarborComposeError, Result};
use crate::shipment::{
    ContainerPayload, EC2_PROVIDER, EnvVarPayload, ParentShipment, PortPayload, ProviderPayload,
    ShipmentEnvironment,
};

/// Default protocol for ports rebuilt from compose files.
pub const DEFAULT_PROTOCOL: &str = "http";

/// Compose projection of a shipment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeProjection {
    /// Services for local `docker-compose up`.
    pub docker_compose: DockerCompose,
    /// Platform settings.
    pub harbor_compose: HarborCompose,
    /// Hidden variables destined for `hidden.env`, escaped.
    pub hidden_env: BTreeMap<String, String>,
    /// Environment-level variables after classification.
    pub environment_vars: ClassifiedEnvVars,
}

/// Project a shipment environment onto docker-compose and harbor-compose models.
pub fn shipment_to_compose(env: &ShipmentEnvironment) -> Result<ComposeProjection> {
    let shipment_name = env.parent_shipment.name.as_str();
    let ec2 = env.provider(EC2_PROVIDER).ok_or_else(|| {
        HarborComposeError::validation(format!(
            "shipment {shipment_name} environment {} has no {EC2_PROVIDER} provider",
            env.name
        ))
    })?;
    let primary = validate_primary_port(env)?;

    let shipment_vars = ClassifiedEnvVars::from_vars(&env.parent_shipment.env_vars);
    let environment_vars = ClassifiedEnvVars::from_vars(&env.env_vars);

    let mut docker_compose = DockerCompose::default();
    let mut hidden_env = environment_vars.hidden.clone();

    for container in &env.containers {
        let mut classified = ClassifiedEnvVars::default();
        classified.classify(&env.parent_shipment.env_vars);
        classified.classify(&env.env_vars);
        classified.classify(&container.env_vars);

        let mut service = DockerComposeService {
            build: None,
            image: container.image.clone(),
            ports: container.ports.iter().map(format_port).collect(),
            environment: classified.basic.clone(),
            env_file: Vec::new(),
        };
        if let Some(port) = container.ports.iter().find(|port| port.primary) {
            service
                .environment
                .insert(PORT_VAR.to_string(), port.value.to_string());
            service
                .environment
                .insert(HEALTHCHECK_VAR.to_string(), port.healthcheck.clone());
        }
        if !classified.hidden.is_empty() {
            service.env_file.push(HIDDEN_ENV_FILE.to_string());
            for (name, value) in &classified.hidden {
                match hidden_env.get(name) {
                    Some(existing) if existing != value => {
                        return Err(HarborComposeError::validation(format!(
                            "hidden variable {name} of container {} conflicts with another \
                             value; {HIDDEN_ENV_FILE} holds one value per name",
                            container.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        hidden_env.insert(name.clone(), value.clone());
                    }
                }
            }
        }
        docker_compose
            .services
            .insert(container.name.clone(), service);
    }

    let mut environment = environment_vars.basic.clone();
    environment.extend(environment_vars.log_shipping.clone());

    let compose_shipment = ComposeShipment {
        env: env.name.clone(),
        barge: ec2.barge.clone(),
        containers: env
            .containers
            .iter()
            .map(|container| container.name.clone())
            .collect(),
        replicas: ec2.replicas,
        group: env.parent_shipment.group.clone(),
        property: metadata(&env.parent_shipment.property, &shipment_vars, "PROPERTY"),
        project: metadata(&env.parent_shipment.project, &shipment_vars, "PROJECT"),
        product: metadata(&env.parent_shipment.product, &shipment_vars, "PRODUCT"),
        environment,
        ignore_image_version: false,
        enable_monitoring: Some(env.enable_monitoring),
        healthcheck_timeout_seconds: primary.healthcheck_timeout,
        healthcheck_interval_seconds: primary.healthcheck_interval,
    };
    let mut harbor_compose = HarborCompose::default();
    harbor_compose
        .shipments
        .insert(shipment_name.to_string(), compose_shipment);

    log::debug!(
        "projected {shipment_name}/{} onto {} services",
        env.name,
        docker_compose.services.len()
    );

    Ok(ComposeProjection {
        docker_compose,
        harbor_compose,
        hidden_env,
        environment_vars,
    })
}

/// Rebuild a shipment environment payload from compose files.
///
/// `hidden_env` holds the parsed hidden env file; its values become
/// environment-level hidden variables.
pub fn compose_to_shipment(
    shipment_name: &str,
    shipment: &ComposeShipment,
    docker_compose: &DockerCompose,
    hidden_env: &BTreeMap<String, String>,
) -> Result<ShipmentEnvironment> {
    if shipment.containers.is_empty() {
        return Err(HarborComposeError::validation(format!(
            "shipment {shipment_name} lists no containers"
        )));
    }
    if shipment.barge.trim().is_empty() {
        return Err(HarborComposeError::validation(format!(
            "shipment {shipment_name} has no barge"
        )));
    }

    let mut env_vars: Vec<EnvVarPayload> = shipment
        .environment
        .iter()
        .filter(|(name, _)| !is_restart_marker(name))
        .map(|(name, value)| EnvVarPayload::basic(name.clone(), unescape_dollars(value)))
        .collect();
    env_vars.extend(
        hidden_env
            .iter()
            .filter(|(name, _)| !is_restart_marker(name))
            .map(|(name, value)| EnvVarPayload::hidden(name.clone(), unescape_dollars(value))),
    );

    let mut containers = Vec::with_capacity(shipment.containers.len());
    let mut primary_assigned = false;
    for name in &shipment.containers {
        let service = docker_compose.service(name)?;
        if service.image.trim().is_empty() {
            return Err(HarborComposeError::validation(format!(
                "service {name} has no image"
            )));
        }
        let mut ports = service
            .ports
            .iter()
            .map(|port| parse_port(port))
            .collect::<Result<Vec<_>>>()?;
        if let Some(path) = service.environment.get(HEALTHCHECK_VAR) {
            if !primary_assigned {
                let index = primary_port_index(name, service, &ports)?;
                if let Some(port) = index.and_then(|index| ports.get_mut(index)) {
                    port.primary = true;
                    port.healthcheck = path.clone();
                    port.healthcheck_timeout = shipment.healthcheck_timeout_seconds;
                    port.healthcheck_interval = shipment.healthcheck_interval_seconds;
                    primary_assigned = true;
                }
            }
        }

        let container_vars = service
            .environment
            .iter()
            .filter(|(key, _)| key.as_str() != PORT_VAR && key.as_str() != HEALTHCHECK_VAR)
            .filter(|(key, _)| !is_restart_marker(key))
            .filter(|(key, value)| shipment.environment.get(*key) != Some(*value))
            .map(|(key, value)| EnvVarPayload::basic(key.clone(), unescape_dollars(value)))
            .collect();

        containers.push(ContainerPayload {
            name: name.clone(),
            image: service.image.clone(),
            ports,
            env_vars: container_vars,
        });
    }

    if !primary_assigned {
        return Err(HarborComposeError::validation(format!(
            "shipment {shipment_name} needs a container with ports and a {HEALTHCHECK_VAR} variable"
        )));
    }

    Ok(ShipmentEnvironment {
        name: shipment.env.clone(),
        build_token: String::new(),
        enable_monitoring: shipment.enable_monitoring.unwrap_or(true),
        iam_role: String::new(),
        parent_shipment: ParentShipment {
            name: shipment_name.to_string(),
            group: shipment.group.clone(),
            customer: String::new(),
            property: shipment.property.clone(),
            project: shipment.project.clone(),
            product: shipment.product.clone(),
            env_vars: Vec::new(),
        },
        env_vars,
        containers,
        providers: vec![ProviderPayload {
            name: EC2_PROVIDER.to_string(),
            replicas: shipment.replicas,
            barge: shipment.barge.clone(),
            env_vars: Vec::new(),
        }],
    })
}

/// Format a port as `public:internal`.
pub fn format_port(port: &PortPayload) -> String {
    format!("{}:{}", port.effective_public_port(), port.value)
}

/// Parse a `public:internal` or `port` mapping.
pub fn parse_port(mapping: &str) -> Result<PortPayload> {
    let invalid =
        || HarborComposeError::validation(format!("port mapping {mapping} is not public:internal"));
    let trimmed = mapping.trim();
    let trimmed = trimmed.split('/').next().unwrap_or(trimmed);
    let (public, internal) = match trimmed.rsplit_once(':') {
        Some((public, internal)) => {
            let public = public.rsplit(':').next().unwrap_or(public);
            (public, internal)
        }
        None => (trimmed, trimmed),
    };
    let value = internal.parse::<u16>().map_err(|_| invalid())?;
    let public_port = public.parse::<u16>().map_err(|_| invalid())?;
    Ok(PortPayload {
        value,
        protocol: DEFAULT_PROTOCOL.to_string(),
        public_port,
        ..PortPayload::default()
    })
}

/// Position in `ports` of the port named by the service's `PORT` variable.
///
/// The first port stands in when `PORT` is unset. A `PORT` that matches no
/// listed port is an error.
pub(crate) fn primary_port_index(
    service_name: &str,
    service: &DockerComposeService,
    ports: &[PortPayload],
) -> Result<Option<usize>> {
    let Some(declared) = service.environment.get(PORT_VAR) else {
        return Ok(if ports.is_empty() { None } else { Some(0) });
    };
    let value = declared.trim().parse::<u16>().map_err(|_| {
        HarborComposeError::validation(format!(
            "service {service_name} has {PORT_VAR}={declared}, which is not a port number"
        ))
    })?;
    match ports.iter().position(|port| port.value == value) {
        Some(index) => Ok(Some(index)),
        None => Err(HarborComposeError::validation(format!(
            "service {service_name} has {PORT_VAR}={value} but maps no such container port"
        ))),
    }
}

fn validate_primary_port(env: &ShipmentEnvironment) -> Result<&PortPayload> {
    match env.primary_port_count() {
        0 => Err(HarborComposeError::validation(format!(
            "shipment {} environment {} has no primary port",
            env.parent_shipment.name, env.name
        ))),
        1 => env.primary_port().map(|(_, port)| port).ok_or_else(|| {
            HarborComposeError::Other("primary port disappeared during lookup".to_string())
        }),
        count => Err(HarborComposeError::validation(format!(
            "shipment {} environment {} has {count} primary ports",
            env.parent_shipment.name, env.name
        ))),
    }
}

fn metadata(declared: &str, special: &ClassifiedEnvVars, name: &str) -> String {
    if !declared.is_empty() {
        return declared.to_string();
    }
    special.special_value(name).unwrap_or_default().to_string()
}
