//! Service endpoints, local state paths and the per-invocation command context.

use crate::CliResult;
use crate::api::HarborApi;
use crate::prompt::Prompter;
use harbor_compose_core::StdFileSystem;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file path.
pub const CONFIG_ENV: &str = "HC_CONFIG";
/// Environment variable that disables telemetry when set to `0`.
pub const TELEMETRY_ENV: &str = "HARBOR_TELEMETRY";

/// Base URIs of the platform services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Shipment metadata service.
    pub shipit: String,
    /// Deployment trigger service.
    pub trigger: String,
    /// Authentication service.
    pub authn: String,
    /// Status and log service.
    pub helmit: String,
    /// Barge and group lookup service.
    pub harbor: String,
    /// Build-token deploy service.
    pub customs: String,
    /// Container catalog service.
    pub catalogit: String,
    /// Usage telemetry collector.
    pub telemetry: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            shipit: "https://shipit.services.dmtio.net".to_string(),
            trigger: "https://trigger.services.dmtio.net".to_string(),
            authn: "https://auth.services.dmtio.net".to_string(),
            helmit: "https://helmit.services.dmtio.net".to_string(),
            harbor: "https://harbor.services.dmtio.net".to_string(),
            customs: "https://customs.services.dmtio.net".to_string(),
            catalogit: "https://catalogit.services.dmtio.net".to_string(),
            telemetry: "https://telemetry.harbor.turnerlabs.io/v1/event".to_string(),
        }
    }
}

/// Settings resolved once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Service endpoints.
    pub endpoints: Endpoints,
    /// Path of the stored credentials.
    pub credentials_path: PathBuf,
    /// Path the endpoints were read from.
    pub config_path: PathBuf,
    /// Whether usage events are sent.
    pub telemetry: bool,
}

impl Settings {
    /// Resolve settings from `HOME`, `HC_CONFIG` and `HARBOR_TELEMETRY`.
    pub fn load() -> CliResult<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let config_override = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let telemetry = std::env::var(TELEMETRY_ENV).ok();
        Self::from_sources(config_override, home, telemetry.as_deref())
    }

    fn from_sources(
        config_override: Option<PathBuf>,
        home: Option<PathBuf>,
        telemetry: Option<&str>,
    ) -> CliResult<Self> {
        let harbor_dir = home
            .filter(|home| !home.as_os_str().is_empty())
            .map(|home| home.join(".harbor"))
            .ok_or("unable to resolve the home directory; set HOME")?;
        let config_path = config_override
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| harbor_dir.join("config"));
        let endpoints = read_endpoints(&config_path)?;
        Ok(Self {
            endpoints,
            credentials_path: harbor_dir.join("credentials"),
            config_path,
            telemetry: telemetry.map(|value| value.trim() != "0").unwrap_or(true),
        })
    }
}

/// A missing config file means every endpoint keeps its default.
fn read_endpoints(path: &Path) -> CliResult<Endpoints> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|err| format!("invalid config {}: {err}", path.display()).into()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no config at {}, using default endpoints", path.display());
            Ok(Endpoints::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// Everything a command needs, built once in `main` and passed down.
pub struct CommandContext {
    /// Resolved settings.
    pub settings: Settings,
    /// Platform API client.
    pub api: HarborApi,
    /// Interactive prompts.
    pub prompter: Box<dyn Prompter + Send + Sync>,
    /// Filesystem used for compose files and artifacts.
    pub fs: StdFileSystem,
    /// Directory holding the compose files.
    pub workdir: PathBuf,
}

impl CommandContext {
    /// Build a context rooted at `workdir`.
    pub fn new(
        settings: Settings,
        prompter: Box<dyn Prompter + Send + Sync>,
        workdir: PathBuf,
    ) -> CliResult<Self> {
        let api = HarborApi::new(settings.endpoints.clone())?;
        Ok(Self {
            settings,
            api,
            prompter,
            fs: StdFileSystem::new(),
            workdir,
        })
    }
}
