//! Commands that change what runs on the platform: up, down, deploy, restart and catalog.

use crate::CliResult;
use crate::api::{CatalogEntry, ContainerImage};
use crate::auth::{Session, ensure_session};
use crate::config::CommandContext;
use crate::project::{ComposeFileArgs, load_project};
use clap::Args;
use harbor_compose_core::{
    EC2_PROVIDER, EnvVarPayload, ImageRef, RESTART_MARKER, ShipmentEnvironment,
    build_token_env_var, compose_to_shipment,
};

/// Arguments for `down`.
#[derive(Args, Clone, Debug, Default)]
pub struct DownArgs {
    #[command(flatten)]
    pub files: ComposeFileArgs,
    /// Delete the environment instead of scaling it to zero.
    #[arg(long)]
    pub delete: bool,
}

/// A change needed to bring a running environment in line with the compose files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Roll a container to a new image.
    Image {
        /// Container name.
        container: String,
        /// New image.
        image: String,
    },
    /// Set an environment-level variable.
    EnvVar(EnvVarPayload),
    /// Set a container-level variable.
    ContainerEnvVar {
        /// Container name.
        container: String,
        /// Variable to set.
        var: EnvVarPayload,
    },
    /// Change the replica count.
    Replicas(u32),
}

/// Diff a running environment against the desired one.
pub fn plan_updates(
    current: &ShipmentEnvironment,
    desired: &ShipmentEnvironment,
    ignore_image_version: bool,
) -> Vec<Update> {
    let mut updates = Vec::new();
    for container in &desired.containers {
        let running = current
            .containers
            .iter()
            .find(|candidate| candidate.name == container.name);
        if !ignore_image_version
            && running.map(|running| running.image.as_str()) != Some(container.image.as_str())
        {
            updates.push(Update::Image {
                container: container.name.clone(),
                image: container.image.clone(),
            });
        }
        let running_vars = running.map(|running| running.env_vars.as_slice()).unwrap_or(&[]);
        for var in &container.env_vars {
            if !running_vars.contains(var) {
                updates.push(Update::ContainerEnvVar {
                    container: container.name.clone(),
                    var: var.clone(),
                });
            }
        }
    }
    for var in &desired.env_vars {
        if !current.env_vars.contains(var) {
            updates.push(Update::EnvVar(var.clone()));
        }
    }
    let replicas = |env: &ShipmentEnvironment| env.provider(EC2_PROVIDER).map(|p| p.replicas);
    if let Some(wanted) = replicas(desired) {
        if replicas(current) != Some(wanted) {
            updates.push(Update::Replicas(wanted));
        }
    }
    updates
}

/// Create or update every shipment in the compose files, then trigger a rollout.
pub async fn run_up(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let session = ensure_session(ctx).await?;
    for (name, shipment) in project.shipments() {
        let hidden_env = project.hidden_env_for(shipment)?;
        let mut desired =
            compose_to_shipment(name, shipment, &project.docker_compose, &hidden_env)?;
        for (container, image) in project.container_images(shipment)? {
            if let Some(payload) = desired.containers.iter_mut().find(|c| c.name == container) {
                payload.image = image;
            }
        }

        match ctx
            .api
            .get_shipment_environment(&session, name, &shipment.env)
            .await?
        {
            None => {
                ctx.api.create_shipment(&session, &desired).await?;
                println!("created {name} {}", shipment.env);
            }
            Some(current) => {
                let updates = plan_updates(&current, &desired, shipment.ignore_image_version);
                apply_updates(ctx, &session, name, &shipment.env, &updates).await?;
                println!("updated {name} {} ({} changes)", shipment.env, updates.len());
            }
        }
        trigger(ctx, &session, name, &shipment.env).await?;
    }
    Ok(())
}

async fn apply_updates(
    ctx: &CommandContext,
    session: &Session,
    shipment: &str,
    env: &str,
    updates: &[Update],
) -> CliResult<()> {
    for update in updates {
        match update {
            Update::Image { container, image } => {
                ctx.api
                    .update_container_image(session, shipment, env, container, image)
                    .await?
            }
            Update::EnvVar(var) => ctx.api.put_env_var(session, shipment, env, var).await?,
            Update::ContainerEnvVar { container, var } => {
                ctx.api
                    .put_container_env_var(session, shipment, env, container, var)
                    .await?
            }
            Update::Replicas(replicas) => {
                ctx.api
                    .update_replicas(session, shipment, env, EC2_PROVIDER, *replicas)
                    .await?
            }
        }
    }
    Ok(())
}

/// Scale every shipment to zero, or delete it with `--delete`.
pub async fn run_down(ctx: &CommandContext, args: &DownArgs) -> CliResult<()> {
    let project = load_project(ctx, &args.files)?;
    let session = ensure_session(ctx).await?;
    for (name, shipment) in project.shipments() {
        if args.delete {
            ctx.api
                .delete_shipment_environment(&session, name, &shipment.env)
                .await?;
            println!("deleted {name} {}", shipment.env);
            continue;
        }
        ctx.api
            .update_replicas(&session, name, &shipment.env, EC2_PROVIDER, 0)
            .await?;
        trigger(ctx, &session, name, &shipment.env).await?;
        println!("stopped {name} {}", shipment.env);
    }
    Ok(())
}

/// Roll out the images in the compose files.
///
/// A `<SHIPMENT>_<ENV>_TOKEN` variable switches to build-token deploys, so CI
/// needs no user credentials.
pub async fn run_deploy(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let mut session = None;
    for (name, shipment) in project.shipments() {
        let images = project.container_images(shipment)?;
        let token_var = build_token_env_var(name, &shipment.env);
        match std::env::var(&token_var).ok().filter(|token| !token.is_empty()) {
            Some(token) => {
                log::debug!("deploying {name} {} with {token_var}", shipment.env);
                let containers: Vec<ContainerImage> = images
                    .into_iter()
                    .map(|(name, image)| ContainerImage { name, image })
                    .collect();
                let response = ctx
                    .api
                    .deploy_with_build_token(&token, name, &shipment.env, EC2_PROVIDER, &containers)
                    .await?;
                report(name, &shipment.env, &response.message);
            }
            None => {
                let active = match session.take() {
                    Some(active) => active,
                    None => ensure_session(ctx).await?,
                };
                for (container, image) in &images {
                    ctx.api
                        .update_container_image(&active, name, &shipment.env, container, image)
                        .await?;
                }
                trigger(ctx, &active, name, &shipment.env).await?;
                session = Some(active);
            }
        }
    }
    Ok(())
}

/// Force a redeploy without changing configuration.
pub async fn run_restart(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let session = ensure_session(ctx).await?;
    let stamp = chrono::Utc::now().to_rfc3339();
    for (name, shipment) in project.shipments() {
        let marker = EnvVarPayload::basic(RESTART_MARKER, stamp.clone());
        ctx.api
            .put_env_var(&session, name, &shipment.env, &marker)
            .await?;
        trigger(ctx, &session, name, &shipment.env).await?;
    }
    Ok(())
}

/// Record every shipment image in the catalog.
pub async fn run_catalog(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let session = ensure_session(ctx).await?;
    for (_, shipment) in project.shipments() {
        for (container, image) in project.container_images(shipment)? {
            let entry = CatalogEntry {
                name: container,
                version: ImageRef::parse(&image).tag(),
                image,
            };
            ctx.api.catalog(&session, &entry).await?;
            println!("cataloged {} {}", entry.name, entry.version);
        }
    }
    Ok(())
}

async fn trigger(ctx: &CommandContext, session: &Session, shipment: &str, env: &str) -> CliResult<()> {
    let response = ctx.api.trigger(session, shipment, env, EC2_PROVIDER).await?;
    report(shipment, env, &response.message);
    Ok(())
}

fn report(shipment: &str, env: &str, message: &str) {
    if message.is_empty() {
        println!("triggered {shipment} {env}");
    } else {
        println!("{shipment} {env}: {message}");
    }
}
