//! Loading compose files from the working directory and writing generated files.

use crate::CliResult;
use crate::config::CommandContext;
use clap::Args;
use harbor_compose_core::{
    Artifact, ComposeShipment, DOCKER_COMPOSE_FILE, DockerCompose, FileSystem, HARBOR_COMPOSE_FILE,
    HIDDEN_ENV_FILE, HarborCompose, WriteOutcome, interpolate, parse_env_file, write_artifact,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Locations of the compose files.
#[derive(Args, Clone, Debug)]
pub struct ComposeFileArgs {
    /// docker-compose file.
    #[arg(short = 'c', long = "compose-file", default_value = DOCKER_COMPOSE_FILE)]
    pub compose_file: PathBuf,
    /// harbor-compose file.
    #[arg(short = 'f', long = "harbor-compose-file", default_value = HARBOR_COMPOSE_FILE)]
    pub harbor_file: PathBuf,
}

impl Default for ComposeFileArgs {
    fn default() -> Self {
        Self {
            compose_file: PathBuf::from(DOCKER_COMPOSE_FILE),
            harbor_file: PathBuf::from(HARBOR_COMPOSE_FILE),
        }
    }
}

/// Compose files parsed from disk.
#[derive(Debug, Clone)]
pub struct ComposeProject {
    /// Parsed docker-compose file.
    pub docker_compose: DockerCompose,
    /// Parsed harbor-compose file.
    pub harbor_compose: HarborCompose,
    /// Parsed env files by name: hidden.env plus every `env_file` a service lists.
    pub env_files: BTreeMap<String, BTreeMap<String, String>>,
}

impl ComposeProject {
    /// Shipments in name order.
    pub fn shipments(&self) -> impl Iterator<Item = (&String, &ComposeShipment)> {
        self.harbor_compose.shipments.iter()
    }

    /// Images of a shipment's containers, interpolated from the process environment.
    pub fn container_images(&self, shipment: &ComposeShipment) -> CliResult<Vec<(String, String)>> {
        shipment
            .containers
            .iter()
            .map(|name| -> CliResult<(String, String)> {
                let service = self.docker_compose.service(name)?;
                Ok((name.clone(), resolve_image(&service.image)))
            })
            .collect()
    }

    /// Hidden variables for one shipment: hidden.env, then the env files of
    /// that shipment's own containers, later files winning.
    pub fn hidden_env_for(&self, shipment: &ComposeShipment) -> CliResult<BTreeMap<String, String>> {
        let mut hidden = self.env_files.get(HIDDEN_ENV_FILE).cloned().unwrap_or_default();
        for name in &shipment.containers {
            let service = self.docker_compose.service(name)?;
            for file in &service.env_file {
                if let Some(vars) = self.env_files.get(file) {
                    hidden.extend(vars.clone());
                }
            }
        }
        Ok(hidden)
    }
}

/// Read the compose files and any env files their services load.
pub fn load_project(ctx: &CommandContext, args: &ComposeFileArgs) -> CliResult<ComposeProject> {
    let compose_path = ctx.workdir.join(&args.compose_file);
    let harbor_path = ctx.workdir.join(&args.harbor_file);
    let docker_compose = DockerCompose::from_yaml(&read(ctx, &compose_path)?)?;
    let harbor_compose = HarborCompose::from_yaml(&read(ctx, &harbor_path)?)?;

    let mut env_files: Vec<&str> = docker_compose
        .services
        .values()
        .flat_map(|service| service.env_file.iter().map(String::as_str))
        .collect();
    env_files.push(HIDDEN_ENV_FILE);
    env_files.sort_unstable();
    env_files.dedup();

    let mut parsed = BTreeMap::new();
    for file in env_files {
        let path = ctx.workdir.join(file);
        if ctx.fs.exists(&path) {
            let vars = parse_env_file(&ctx.fs.read_to_string(&path)?)?;
            parsed.insert(file.to_string(), vars);
        }
    }

    Ok(ComposeProject {
        docker_compose,
        harbor_compose,
        env_files: parsed,
    })
}

fn read(ctx: &CommandContext, path: &Path) -> CliResult<String> {
    if !ctx.fs.exists(path) {
        return Err(format!("{} not found", path.display()).into());
    }
    Ok(ctx.fs.read_to_string(path)?)
}

/// Expand `${VAR}` references in an image using the process environment.
pub fn resolve_image(image: &str) -> String {
    interpolate(image, |name| std::env::var(name).ok())
}

/// Write artifacts, asking before replacing existing files.
pub fn write_artifacts(ctx: &CommandContext, artifacts: &[Artifact]) -> CliResult<usize> {
    let mut written = 0;
    for artifact in artifacts {
        let outcome = write_artifact(&ctx.fs, &ctx.workdir, artifact, |path| {
            ctx.prompter
                .confirm(&format!("{} exists, overwrite?", path.display()))
                .map_err(|err| harbor_compose_core::HarborComposeError::Other(err.to_string()))
        })?;
        if outcome == WriteOutcome::Written {
            written += 1;
        }
    }
    Ok(written)
}
