//! `docker-compose.yml` and `harbor-compose.yml` models.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{HarborComposeError, Result};

/// Default docker-compose file name.
pub const DOCKER_COMPOSE_FILE: &str = "docker-compose.yml";
/// Default harbor-compose file name.
pub const HARBOR_COMPOSE_FILE: &str = "harbor-compose.yml";
/// Env file holding hidden variables.
pub const HIDDEN_ENV_FILE: &str = "hidden.env";
/// docker-compose file format version written by harbor-compose.
pub const DOCKER_COMPOSE_VERSION: &str = "2";
/// Name of the variable carrying the primary port.
pub const PORT_VAR: &str = "PORT";
/// Name of the variable carrying the health check path.
pub const HEALTHCHECK_VAR: &str = "HEALTHCHECK";

/// A `docker-compose.yml` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerCompose {
    /// File format version.
    pub version: String,
    /// Services keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, DockerComposeService>,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self {
            version: DOCKER_COMPOSE_VERSION.to_string(),
            services: BTreeMap::new(),
        }
    }
}

impl DockerCompose {
    /// Parse a docker-compose document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Look up a service, failing with a descriptive error when absent.
    pub fn service(&self, name: &str) -> Result<&DockerComposeService> {
        self.services.get(name).ok_or_else(|| {
            HarborComposeError::validation(format!(
                "service {name} not found in {DOCKER_COMPOSE_FILE}"
            ))
        })
    }
}

/// A single docker-compose service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerComposeService {
    /// Build context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    /// Image reference.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// `public:internal` port mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment variables.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_environment"
    )]
    pub environment: BTreeMap<String, String>,
    /// Env files loaded into the container.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_env_file"
    )]
    pub env_file: Vec<String>,
}

/// A `harbor-compose.yml` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarborCompose {
    /// Shipments keyed by name.
    #[serde(default)]
    pub shipments: BTreeMap<String, ComposeShipment>,
}

impl HarborCompose {
    /// Parse a harbor-compose document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let parsed: Self = serde_yaml::from_str(contents)?;
        if parsed.shipments.is_empty() {
            return Err(HarborComposeError::validation(format!(
                "{HARBOR_COMPOSE_FILE} defines no shipments"
            )));
        }
        Ok(parsed)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// First shipment ordered by name.
    pub fn first_shipment(&self) -> Option<(&str, &ComposeShipment)> {
        self.shipments
            .iter()
            .next()
            .map(|(name, shipment)| (name.as_str(), shipment))
    }
}

/// Platform settings for one shipment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeShipment {
    /// Environment name.
    pub env: String,
    /// Barge to deploy to.
    pub barge: String,
    /// Service names from docker-compose.yml that make up the shipment.
    pub containers: Vec<String>,
    /// Replica count.
    pub replicas: u32,
    /// Owning group.
    pub group: String,
    /// Property metadata.
    #[serde(default)]
    pub property: String,
    /// Project metadata.
    #[serde(default)]
    pub project: String,
    /// Product metadata.
    #[serde(default)]
    pub product: String,
    /// Environment-level variables.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_environment"
    )]
    pub environment: BTreeMap<String, String>,
    /// Skip image updates on `up`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_image_version: bool,
    /// Platform monitoring toggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_monitoring: Option<bool>,
    /// Health check timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_timeout_seconds: Option<u32>,
    /// Health check interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_interval_seconds: Option<u32>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentForm {
    Map(BTreeMap<String, serde_yaml::Value>),
    List(Vec<String>),
}

fn deserialize_environment<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let form = Option::<EnvironmentForm>::deserialize(deserializer)?;
    let environment = match form {
        None => BTreeMap::new(),
        Some(EnvironmentForm::Map(map)) => map
            .into_iter()
            .map(|(key, value)| (key, scalar_to_string(value)))
            .collect(),
        Some(EnvironmentForm::List(entries)) => entries
            .into_iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (entry, String::new()),
            })
            .collect(),
    };
    Ok(environment)
}

fn scalar_to_string(value: serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(flag) => flag.to_string(),
        serde_yaml::Value::Number(number) => number.to_string(),
        serde_yaml::Value::String(text) => text,
        other => serde_yaml::to_string(&other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EnvFileForm {
    One(String),
    Many(Vec<String>),
}

fn deserialize_env_file<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<EnvFileForm>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(EnvFileForm::One(file)) => vec![file],
        Some(EnvFileForm::Many(files)) => files,
    })
}

/// Render `KEY=value` lines sorted by key.
pub fn format_env_file(vars: &BTreeMap<String, String>) -> String {
    let mut output = String::new();
    for (key, value) in vars {
        output.push_str(key);
        output.push('=');
        output.push_str(value);
        output.push('\n');
    }
    output
}

/// Parse `KEY=value` lines, ignoring blank lines and `#` comments.
pub fn parse_env_file(contents: &str) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for (index, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(HarborComposeError::validation(format!(
                "env file line {} is not KEY=value",
                index + 1
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(HarborComposeError::validation(format!(
                "env file line {} has an empty name",
                index + 1
            )));
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Apply docker-compose style interpolation to a value.
///
/// Supports `$$`, `$NAME`, `${NAME}` and `${NAME:-default}`; unknown names
/// expand to an empty string, as docker-compose does.
pub fn interpolate<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                output.push('$');
            }
            Some('{') => {
                chars.next();
                let mut expr = String::new();
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                    expr.push(inner);
                }
                let (name, default) = match expr.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (expr.as_str(), None),
                };
                match lookup(name).filter(|resolved| !resolved.is_empty()) {
                    Some(resolved) => output.push_str(&resolved),
                    None => output.push_str(default.unwrap_or("")),
                }
            }
            Some(next) if next.is_ascii_alphabetic() || *next == '_' => {
                let mut name = String::new();
                while let Some(inner) = chars.peek() {
                    if inner.is_ascii_alphanumeric() || *inner == '_' {
                        name.push(*inner);
                        chars.next();
                    } else {
                        break;
                    }
                }
                output.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => output.push('$'),
        }
    }
    output
}
