//! Shipment payloads exchanged with the platform API.

use serde::{Deserialize, Serialize};

/// Name of the provider that carries barge and replica settings.
pub const EC2_PROVIDER: &str = "ec2";

/// A named environment under a parent shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentEnvironment {
    /// Environment name (e.g. `dev`, `qa`, `prod`).
    pub name: String,
    /// Token CI systems use to deploy without user credentials.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_token: String,
    /// Whether platform monitoring is enabled.
    #[serde(default)]
    pub enable_monitoring: bool,
    /// IAM role assumed by the running containers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iam_role: String,
    /// Owning shipment.
    pub parent_shipment: ParentShipment,
    /// Environment-level variables.
    #[serde(default)]
    pub env_vars: Vec<EnvVarPayload>,
    /// Containers deployed in this environment.
    #[serde(default)]
    pub containers: Vec<ContainerPayload>,
    /// Deployment providers.
    #[serde(default)]
    pub providers: Vec<ProviderPayload>,
}

impl ShipmentEnvironment {
    /// Find a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderPayload> {
        self.providers.iter().find(|provider| provider.name == name)
    }

    /// Locate the single primary port and the container that owns it.
    pub fn primary_port(&self) -> Option<(&ContainerPayload, &PortPayload)> {
        self.containers.iter().find_map(|container| {
            container
                .ports
                .iter()
                .find(|port| port.primary)
                .map(|port| (container, port))
        })
    }

    /// Number of ports flagged primary across every container.
    pub fn primary_port_count(&self) -> usize {
        self.containers
            .iter()
            .flat_map(|container| container.ports.iter())
            .filter(|port| port.primary)
            .count()
    }
}

/// Shipment-level metadata shared by every environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentShipment {
    /// Shipment name.
    pub name: String,
    /// Owning group.
    #[serde(default)]
    pub group: String,
    /// Customer the shipment belongs to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub customer: String,
    /// Property the shipment belongs to.
    #[serde(default)]
    pub property: String,
    /// Project the shipment belongs to.
    #[serde(default)]
    pub project: String,
    /// Product the shipment belongs to.
    #[serde(default)]
    pub product: String,
    /// Shipment-level variables.
    #[serde(default)]
    pub env_vars: Vec<EnvVarPayload>,
}

/// A container definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPayload {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Ports in declaration order.
    #[serde(default)]
    pub ports: Vec<PortPayload>,
    /// Container-level variables.
    #[serde(default)]
    pub env_vars: Vec<EnvVarPayload>,
}

/// A container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortPayload {
    /// Port the container listens on.
    pub value: u16,
    /// Protocol, usually `http`, `https` or `tcp`.
    #[serde(default)]
    pub protocol: String,
    /// Port exposed by the load balancer; zero means "same as `value`".
    #[serde(default)]
    pub public_port: u16,
    /// Health check path.
    #[serde(default)]
    pub healthcheck: String,
    /// Health check interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_interval: Option<u32>,
    /// Health check timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_timeout: Option<u32>,
    /// Whether this is the environment's primary port.
    #[serde(default)]
    pub primary: bool,
    /// Whether the load balancer has a public VIP.
    #[serde(default)]
    pub public_vip: bool,
    /// Whether the port is reachable outside the network.
    #[serde(default)]
    pub external: bool,
    /// Optional port name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl PortPayload {
    /// Public port, defaulting to the internal port when unset.
    pub fn effective_public_port(&self) -> u16 {
        if self.public_port == 0 {
            self.value
        } else {
            self.public_port
        }
    }
}

/// A deployment provider such as `ec2`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayload {
    /// Provider name.
    pub name: String,
    /// Number of replicas to run.
    #[serde(default)]
    pub replicas: u32,
    /// Barge the provider deploys to.
    #[serde(default)]
    pub barge: String,
    /// Provider-level variables.
    #[serde(default)]
    pub env_vars: Vec<EnvVarPayload>,
}

/// Declared type of an environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvVarType {
    /// Plain configuration.
    #[default]
    Basic,
    /// Secret value that must not be committed.
    Hidden,
}

/// An environment variable as carried by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarPayload {
    /// Variable name.
    pub name: String,
    /// Variable value.
    #[serde(default)]
    pub value: String,
    /// Declared type.
    #[serde(rename = "type", default)]
    pub var_type: EnvVarType,
}

impl EnvVarPayload {
    /// Build a basic variable.
    pub fn basic(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            var_type: EnvVarType::Basic,
        }
    }

    /// Build a hidden variable.
    pub fn hidden(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            var_type: EnvVarType::Hidden,
        }
    }
}
