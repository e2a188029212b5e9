#![deny(missing_docs)]
//! harbor-compose command-line interface.
//!
//! Manages platform shipments from docker-compose and harbor-compose files.

mod api;
mod auth;
mod config;
mod generate;
mod inspect;
mod lifecycle;
mod project;
mod prompt;
mod telemetry;

use auth::LoginArgs;
use clap::{Parser, Subcommand};
use config::{CommandContext, Settings};
use generate::{GenerateArgs, InitArgs, MigrateArgs, TerraformArgs};
use inspect::{EnvCommand, LogsArgs};
use lifecycle::DownArgs;
use project::ComposeFileArgs;
use prompt::StdinPrompter;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "harbor-compose", version, about = "Deploy shipments described by compose files")]
struct Cli {
    /// Answer yes to every confirmation.
    #[arg(short = 'y', long = "yes", global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update shipments and start them.
    Up(ComposeFileArgs),
    /// Stop shipments, or delete them with --delete.
    Down(DownArgs),
    /// Roll out the images in docker-compose.yml.
    Deploy(ComposeFileArgs),
    /// Show container status.
    Ps(ComposeFileArgs),
    /// Show recent container logs.
    Logs(LogsArgs),
    /// Manage environment variables.
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },
    /// Write compose files for an existing shipment.
    Generate(GenerateArgs),
    /// Scaffold compose files for a new shipment.
    Init(InitArgs),
    /// Migrate a shipment to another platform.
    Migrate(MigrateArgs),
    /// Write terraform source for an existing shipment.
    Terraform(TerraformArgs),
    /// Record shipment images in the container catalog.
    Catalog(ComposeFileArgs),
    /// Restart shipments without changing configuration.
    Restart(ComposeFileArgs),
    /// Log in and store a token.
    Login(LoginArgs),
    /// Revoke the stored token.
    Logout,
    /// Print the CLI version.
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Up(_) => "up",
            Commands::Down(_) => "down",
            Commands::Deploy(_) => "deploy",
            Commands::Ps(_) => "ps",
            Commands::Logs(_) => "logs",
            Commands::Env { command } => match command {
                EnvCommand::List { .. } => "env list",
                EnvCommand::Push(_) => "env push",
                EnvCommand::Pull(_) => "env pull",
            },
            Commands::Generate(_) => "generate",
            Commands::Init(_) => "init",
            Commands::Migrate(_) => "migrate",
            Commands::Terraform(_) => "terraform",
            Commands::Catalog(_) => "catalog",
            Commands::Restart(_) => "restart",
            Commands::Login(_) => "login",
            Commands::Logout => "logout",
            Commands::Version => "version",
        }
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run(Cli::parse()).await {
        log::error!("{err}");
        std::process::exit(-1);
    }
}

#[cfg(test)]
fn main() {}

async fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Version = cli.command {
        println!("harbor-compose {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let settings = Settings::load()?;
    log::debug!("endpoints from {}", settings.config_path.display());
    let workdir = std::env::current_dir()?;
    let ctx = CommandContext::new(settings, Box::new(StdinPrompter::new(cli.yes)), workdir)?;

    let pending = telemetry::spawn(ctx.settings.telemetry, &ctx.api, cli.command.name());
    let result = dispatch(&ctx, cli.command).await;
    telemetry::flush(pending).await;
    result
}

async fn dispatch(ctx: &CommandContext, command: Commands) -> CliResult<()> {
    match command {
        Commands::Up(files) => lifecycle::run_up(ctx, &files).await,
        Commands::Down(args) => lifecycle::run_down(ctx, &args).await,
        Commands::Deploy(files) => lifecycle::run_deploy(ctx, &files).await,
        Commands::Ps(files) => inspect::run_ps(ctx, &files).await,
        Commands::Logs(args) => inspect::run_logs(ctx, &args).await,
        Commands::Env { command } => inspect::run_env(ctx, &command).await,
        Commands::Generate(args) => generate::run_generate(ctx, &args).await,
        Commands::Init(args) => generate::run_init(ctx, &args).await,
        Commands::Migrate(args) => generate::run_migrate(ctx, &args).await,
        Commands::Terraform(args) => generate::run_terraform(ctx, &args).await,
        Commands::Catalog(files) => lifecycle::run_catalog(ctx, &files).await,
        Commands::Restart(files) => lifecycle::run_restart(ctx, &files).await,
        Commands::Login(args) => auth::run_login(ctx, args).await,
        Commands::Logout => auth::run_logout(ctx).await,
        Commands::Version => Ok(()),
    }
}
