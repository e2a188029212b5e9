//! Read-mostly commands: ps, logs and env.

use crate::CliResult;
use crate::api::ShipmentStatus;
use crate::auth::ensure_session;
use crate::config::CommandContext;
use crate::project::{ComposeFileArgs, load_project, write_artifacts};
use clap::{Args, Subcommand};
use harbor_compose_core::{
    Artifact, EnvVarPayload, EnvVarType, FileSystem, HIDDEN_ENV_FILE, ShipmentEnvironment, escape_dollars,
    format_env_file, parse_env_file, unescape_dollars,
};
use std::collections::BTreeMap;

const MASK: &str = "********";

/// `env` subcommands.
#[derive(Subcommand, Clone, Debug)]
pub enum EnvCommand {
    /// List variables at every level.
    List {
        #[command(flatten)]
        files: ComposeFileArgs,
        /// Print hidden values instead of masking them.
        #[arg(long)]
        show_hidden: bool,
    },
    /// Upload hidden.env as hidden environment variables.
    Push(ComposeFileArgs),
    /// Download hidden variables into hidden.env.
    Pull(ComposeFileArgs),
}

/// Arguments for `logs`.
#[derive(Args, Clone, Debug, Default)]
pub struct LogsArgs {
    #[command(flatten)]
    pub files: ComposeFileArgs,
}

/// Print replica status for each shipment.
pub async fn run_ps(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    for (name, shipment) in project.shipments() {
        let status = ctx.api.status(&shipment.barge, name, &shipment.env).await?;
        print!("{}", render_status(name, &shipment.env, &status));
    }
    Ok(())
}

/// Print recent logs for each shipment.
pub async fn run_logs(ctx: &CommandContext, args: &LogsArgs) -> CliResult<()> {
    let project = load_project(ctx, &args.files)?;
    for (name, shipment) in project.shipments() {
        let logs = ctx.api.logs(&shipment.barge, name, &shipment.env).await?;
        println!("==> {name} {} <==", shipment.env);
        println!("{}", logs.trim_end());
    }
    Ok(())
}

/// Dispatch an `env` subcommand.
pub async fn run_env(ctx: &CommandContext, command: &EnvCommand) -> CliResult<()> {
    match command {
        EnvCommand::List { files, show_hidden } => list(ctx, files, *show_hidden).await,
        EnvCommand::Push(files) => push(ctx, files).await,
        EnvCommand::Pull(files) => pull(ctx, files).await,
    }
}

async fn list(ctx: &CommandContext, files: &ComposeFileArgs, show_hidden: bool) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let session = ensure_session(ctx).await?;
    for (name, shipment) in project.shipments() {
        let environment = ctx
            .api
            .get_shipment_environment(&session, name, &shipment.env)
            .await?
            .ok_or_else(|| format!("{name} {} does not exist", shipment.env))?;
        print!("{}", render_env_list(&environment, show_hidden));
    }
    Ok(())
}

async fn push(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let path = ctx.workdir.join(HIDDEN_ENV_FILE);
    if !ctx.fs.exists(&path) {
        return Err(format!("{} not found", path.display()).into());
    }
    let hidden = parse_env_file(&ctx.fs.read_to_string(&path)?)?;
    let session = ensure_session(ctx).await?;
    for (name, shipment) in project.shipments() {
        for (key, value) in &hidden {
            let var = EnvVarPayload::hidden(key.clone(), unescape_dollars(value));
            ctx.api.put_env_var(&session, name, &shipment.env, &var).await?;
        }
        println!("pushed {} hidden variables to {name} {}", hidden.len(), shipment.env);
    }
    Ok(())
}

async fn pull(ctx: &CommandContext, files: &ComposeFileArgs) -> CliResult<()> {
    let project = load_project(ctx, files)?;
    let session = ensure_session(ctx).await?;
    let mut hidden = BTreeMap::new();
    for (name, shipment) in project.shipments() {
        let environment = ctx
            .api
            .get_shipment_environment(&session, name, &shipment.env)
            .await?
            .ok_or_else(|| format!("{name} {} does not exist", shipment.env))?;
        hidden.extend(hidden_vars(&environment));
    }
    // hidden.env always holds `$$`-escaped values, the same as `generate` writes.
    let escaped: BTreeMap<String, String> = hidden
        .iter()
        .map(|(name, value)| (name.clone(), escape_dollars(value)))
        .collect();
    write_artifacts(
        ctx,
        &[Artifact::with_mode(
            HIDDEN_ENV_FILE,
            format_env_file(&escaped),
            0o600,
        )],
    )?;
    Ok(())
}

/// Hidden variables from every level, later levels winning.
fn hidden_vars(environment: &ShipmentEnvironment) -> BTreeMap<String, String> {
    let levels = std::iter::once(&environment.parent_shipment.env_vars)
        .chain(std::iter::once(&environment.env_vars))
        .chain(environment.providers.iter().map(|provider| &provider.env_vars))
        .chain(environment.containers.iter().map(|container| &container.env_vars));
    levels
        .flatten()
        .filter(|var| var.var_type == EnvVarType::Hidden)
        .map(|var| (var.name.clone(), var.value.clone()))
        .collect()
}

/// Tabulate container status.
pub fn render_status(shipment: &str, env: &str, status: &ShipmentStatus) -> String {
    let mut out = format!(
        "{shipment} {env} version={} phase={}\n",
        display(&status.version),
        display(&status.status.phase)
    );
    let rows: Vec<[String; 5]> = status
        .status
        .containers
        .iter()
        .map(|container| {
            [
                container.name.clone(),
                container.id.clone(),
                container.state.clone(),
                container.restart_count.to_string(),
                if container.ready { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    let header = ["CONTAINER", "ID", "STATE", "RESTARTS", "READY"].map(str::to_string);
    let mut widths = header.clone().map(|column| column.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    for row in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Variables grouped by level, hidden values masked unless `show_hidden`.
pub fn render_env_list(environment: &ShipmentEnvironment, show_hidden: bool) -> String {
    let mut out = format!(
        "{} {}\n",
        environment.parent_shipment.name, environment.name
    );
    section(&mut out, "shipment", &environment.parent_shipment.env_vars, show_hidden);
    section(&mut out, "environment", &environment.env_vars, show_hidden);
    for provider in &environment.providers {
        section(
            &mut out,
            &format!("provider {}", provider.name),
            &provider.env_vars,
            show_hidden,
        );
    }
    for container in &environment.containers {
        section(
            &mut out,
            &format!("container {}", container.name),
            &container.env_vars,
            show_hidden,
        );
    }
    out
}

fn section(out: &mut String, title: &str, vars: &[EnvVarPayload], show_hidden: bool) {
    if vars.is_empty() {
        return;
    }
    out.push_str(&format!("  [{title}]\n"));
    for var in vars {
        let value = match var.var_type {
            EnvVarType::Hidden if !show_hidden => MASK,
            _ => var.value.as_str(),
        };
        out.push_str(&format!("    {}={value}\n", var.name));
    }
}

fn display(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
