//! Commands that write files: generate, init, migrate and terraform.

use crate::CliResult;
use crate::auth::ensure_session;
use crate::config::CommandContext;
use crate::project::{ComposeFileArgs, load_project, write_artifacts};
use clap::Args;
use harbor_compose_core::{
    Artifact, DOCKER_COMPOSE_FILE, ECS_FARGATE_PLATFORM, FargateOptions, HARBOR_COMPOSE_FILE,
    HIDDEN_ENV_FILE, InitOptions, ShipmentEnvironment, build_provider, ensure_line,
    fargate_artifacts, format_env_file, scaffold, shipment_to_compose, terraform_artifacts,
};

const GITIGNORE: &str = ".gitignore";

/// Arguments for `generate`.
#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Shipment name.
    pub shipment: String,
    /// Environment name.
    pub env: String,
    /// Build provider whose files are generated alongside the compose files.
    #[arg(short = 'b', long = "build-provider", default_value = "local")]
    pub build_provider: String,
}

/// Arguments for `init`; anything omitted is prompted for.
#[derive(Args, Clone, Debug, Default)]
pub struct InitArgs {
    /// Shipment name.
    #[arg(long)]
    pub name: Option<String>,
    /// Environment name.
    #[arg(long)]
    pub env: Option<String>,
    /// Barge to deploy to.
    #[arg(long)]
    pub barge: Option<String>,
    /// Owning group.
    #[arg(long)]
    pub group: Option<String>,
    /// Replica count.
    #[arg(long)]
    pub replicas: Option<u32>,
    /// Container image.
    #[arg(long)]
    pub image: Option<String>,
    /// Port the container listens on.
    #[arg(long)]
    pub port: Option<u16>,
    /// Health check path.
    #[arg(long)]
    pub healthcheck: Option<String>,
    /// Property metadata.
    #[arg(long, default_value = "")]
    pub property: String,
    /// Project metadata.
    #[arg(long, default_value = "")]
    pub project: String,
    /// Product metadata.
    #[arg(long, default_value = "")]
    pub product: String,
}

/// Arguments for `migrate`.
#[derive(Args, Clone, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub files: ComposeFileArgs,
    /// Target platform.
    #[arg(long, default_value = ECS_FARGATE_PLATFORM)]
    pub platform: String,
    /// AWS account id.
    #[arg(long = "account-id", default_value = "")]
    pub account_id: String,
    /// IAM role terraform assumes.
    #[arg(long, default_value = "")]
    pub role: String,
    /// AWS region.
    #[arg(long, default_value = "")]
    pub region: String,
    /// AWS CLI profile.
    #[arg(long, default_value = "")]
    pub profile: String,
    /// VPC id.
    #[arg(long, default_value = "")]
    pub vpc: String,
    /// Comma separated private subnet ids.
    #[arg(long = "private-subnets", default_value = "")]
    pub private_subnets: String,
    /// Comma separated public subnet ids.
    #[arg(long = "public-subnets", default_value = "")]
    pub public_subnets: String,
}

impl MigrateArgs {
    fn overrides(&self) -> FargateOptions {
        FargateOptions {
            account_id: self.account_id.clone(),
            role: self.role.clone(),
            region: self.region.clone(),
            profile: self.profile.clone(),
            vpc: self.vpc.clone(),
            private_subnets: self.private_subnets.clone(),
            public_subnets: self.public_subnets.clone(),
        }
    }
}

/// Arguments for `terraform`.
#[derive(Args, Clone, Debug)]
pub struct TerraformArgs {
    /// Shipment name.
    pub shipment: String,
    /// Environment name.
    pub env: String,
}

/// Write compose files (and build provider files) for an existing shipment.
pub async fn run_generate(ctx: &CommandContext, args: &GenerateArgs) -> CliResult<()> {
    let provider = build_provider(&args.build_provider)?;
    let environment = fetch_environment(ctx, &args.shipment, &args.env).await?;
    let mut projection = shipment_to_compose(&environment)?;
    let provided = provider.provide_artifacts(
        &mut projection.docker_compose,
        &projection.harbor_compose,
        &environment.build_token,
    )?;

    let mut artifacts = vec![
        Artifact::new(DOCKER_COMPOSE_FILE, projection.docker_compose.to_yaml()?),
        Artifact::new(HARBOR_COMPOSE_FILE, projection.harbor_compose.to_yaml()?),
    ];
    if !projection.hidden_env.is_empty() {
        artifacts.push(Artifact::with_mode(
            HIDDEN_ENV_FILE,
            format_env_file(&projection.hidden_env),
            0o600,
        ));
    }
    artifacts.extend(provided);
    let written = write_artifacts(ctx, &artifacts)?;

    let gitignore = ctx.workdir.join(GITIGNORE);
    for entry in std::iter::once(HIDDEN_ENV_FILE).chain(provider.ignored_files()) {
        if ensure_line(&ctx.fs, &gitignore, entry)? {
            log::info!("added {entry} to {GITIGNORE}");
        }
    }
    println!(
        "generated {written} files for {} {} ({})",
        args.shipment,
        args.env,
        provider.id()
    );
    Ok(())
}

/// Scaffold compose files for a new shipment.
pub async fn run_init(ctx: &CommandContext, args: &InitArgs) -> CliResult<()> {
    let options = collect_init_options(ctx, args).await?;
    let (docker_compose, harbor_compose) = scaffold(&options)?;
    let written = write_artifacts(
        ctx,
        &[
            Artifact::new(DOCKER_COMPOSE_FILE, docker_compose.to_yaml()?),
            Artifact::new(HARBOR_COMPOSE_FILE, harbor_compose.to_yaml()?),
        ],
    )?;
    if written > 0 {
        println!("initialized {} {}", options.name, options.env);
    }
    Ok(())
}

async fn collect_init_options(ctx: &CommandContext, args: &InitArgs) -> CliResult<InitOptions> {
    let defaults = InitOptions::default();
    let prompter = &ctx.prompter;
    let name = match args.name.clone() {
        Some(name) => name,
        None => prompter.ask("Shipment name", None)?,
    };
    let env = match args.env.clone() {
        Some(env) => env,
        None => prompter.ask("Environment", Some(&defaults.env))?,
    };
    let group = match args.group.clone() {
        Some(group) => group,
        None => prompter.ask("Group", None)?,
    };
    let barge = match args.barge.clone() {
        Some(barge) => barge,
        None => {
            let hint = barge_hint(ctx, &group).await;
            prompter.ask("Barge", hint.as_deref())?
        }
    };
    let replicas = match args.replicas {
        Some(replicas) => replicas,
        None => prompter
            .ask("Replicas", Some(&defaults.replicas.to_string()))?
            .parse::<u32>()
            .map_err(|err| format!("invalid replica count: {err}"))?,
    };
    let port = match args.port {
        Some(port) => port,
        None => prompter
            .ask("Container port", Some(&defaults.port.to_string()))?
            .parse::<u16>()
            .map_err(|err| format!("invalid port: {err}"))?,
    };
    let healthcheck = match args.healthcheck.clone() {
        Some(healthcheck) => healthcheck,
        None => prompter.ask("Health check path", Some(&defaults.healthcheck))?,
    };
    Ok(InitOptions {
        name,
        env,
        barge,
        group,
        replicas,
        image: args.image.clone(),
        port,
        healthcheck,
        property: args.property.clone(),
        project: args.project.clone(),
        product: args.product.clone(),
    })
}

/// First barge the group may deploy to, used as the prompt default.
async fn barge_hint(ctx: &CommandContext, group: &str) -> Option<String> {
    match ctx.api.group_barges(group).await {
        Ok(barges) => {
            let names: Vec<&str> = barges.iter().map(|barge| barge.name.as_str()).collect();
            if !names.is_empty() {
                println!("barges available to {group}: {}", names.join(", "));
            }
            names.first().map(|name| name.to_string())
        }
        Err(err) => {
            log::debug!("barge lookup for {group} failed: {err}");
            None
        }
    }
}

/// Move a shipment to ECS Fargate.
pub async fn run_migrate(ctx: &CommandContext, args: &MigrateArgs) -> CliResult<()> {
    if !args.platform.eq_ignore_ascii_case(ECS_FARGATE_PLATFORM) {
        return Err(format!(
            "unsupported platform {}; supported: {ECS_FARGATE_PLATFORM}",
            args.platform
        )
        .into());
    }
    let mut project = load_project(ctx, &args.files)?;
    let (name, shipment) = project
        .harbor_compose
        .first_shipment()
        .map(|(name, shipment)| (name.to_string(), shipment.clone()))
        .ok_or("harbor-compose file lists no shipments")?;

    let from_barge = match ctx.api.barge(&shipment.barge).await {
        Ok(barge) => barge.fargate_options(),
        Err(err) => {
            log::warn!("barge {} lookup failed: {err}", shipment.barge);
            FargateOptions::default()
        }
    };
    let options = from_barge.overridden_by(&args.overrides());
    let mut artifacts =
        fargate_artifacts(&name, &shipment, &mut project.docker_compose, &options)?;
    artifacts.push(Artifact::new(
        &args.files.compose_file,
        project.docker_compose.to_yaml()?,
    ));

    let written = write_artifacts(ctx, &artifacts)?;
    println!("migration bundle for {name} {}: {written} files", shipment.env);
    Ok(())
}

/// Write terraform source for an existing shipment.
pub async fn run_terraform(ctx: &CommandContext, args: &TerraformArgs) -> CliResult<()> {
    let environment = fetch_environment(ctx, &args.shipment, &args.env).await?;
    let written = write_artifacts(ctx, &terraform_artifacts(&environment)?)?;
    println!("terraform for {} {}: {written} files", args.shipment, args.env);
    Ok(())
}

async fn fetch_environment(
    ctx: &CommandContext,
    shipment: &str,
    env: &str,
) -> CliResult<ShipmentEnvironment> {
    let session = ensure_session(ctx).await?;
    ctx.api
        .get_shipment_environment(&session, shipment, env)
        .await?
        .ok_or_else(|| format!("shipment {shipment} environment {env} not found").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::{ScriptedPrompter, context, temp_dir};
    use harbor_compose_core::{DockerCompose, HarborCompose, parse_env_file};
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::{Value, json};
    use std::path::PathBuf;

    fn logged_in_dir(label: &str) -> PathBuf {
        let dir = temp_dir(label);
        std::fs::create_dir_all(dir.join(".harbor")).expect("harbor dir");
        std::fs::write(
            dir.join(".harbor").join("credentials"),
            r#"{"version":"1","username":"deployer","token":"tok"}"#,
        )
        .expect("credentials");
        dir
    }

    fn environment_json() -> Value {
        json!({
            "name": "dev",
            "buildToken": "build-secret",
            "enableMonitoring": true,
            "parentShipment": {"name": "mss-web", "group": "mss"},
            "envVars": [
                {"name": "LOG_LEVEL", "value": "debug", "type": "basic"},
                {"name": "DB_PASSWORD", "value": "s3cret", "type": "hidden"}
            ],
            "containers": [{
                "name": "web",
                "image": "quay.io/org/web:1.0.0",
                "ports": [{"value": 3000, "protocol": "http", "publicPort": 80,
                    "healthcheck": "/health", "primary": true}]
            }],
            "providers": [{"name": "ec2", "replicas": 2, "barge": "sandbox"}]
        })
    }

    async fn serve_environment(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/auth/checktoken");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/shipment/mss-web/environment/dev/");
                then.status(200).json_body(environment_json());
            })
            .await;
    }

    #[tokio::test]
    async fn generate_writes_compose_files_and_gitignore() {
        let server = MockServer::start_async().await;
        serve_environment(&server).await;
        let dir = logged_in_dir("generate-local");
        let ctx = context(&server.base_url(), dir.clone(), ScriptedPrompter::new(&[], true));

        run_generate(
            &ctx,
            &GenerateArgs {
                shipment: "mss-web".to_string(),
                env: "dev".to_string(),
                build_provider: "local".to_string(),
            },
        )
        .await
        .expect("generate");

        let compose = DockerCompose::from_yaml(
            &std::fs::read_to_string(dir.join(DOCKER_COMPOSE_FILE)).expect("docker"),
        )
        .expect("parse docker");
        let web = compose.service("web").expect("web");
        assert_eq!(web.ports, vec!["80:3000"]);
        assert_eq!(web.environment["LOG_LEVEL"], "debug");
        let harbor = HarborCompose::from_yaml(
            &std::fs::read_to_string(dir.join(HARBOR_COMPOSE_FILE)).expect("harbor"),
        )
        .expect("parse harbor");
        assert_eq!(harbor.shipments["mss-web"].barge, "sandbox");
        let hidden = parse_env_file(
            &std::fs::read_to_string(dir.join(HIDDEN_ENV_FILE)).expect("hidden"),
        )
        .expect("parse hidden");
        assert_eq!(hidden["DB_PASSWORD"], "s3cret");
        let gitignore = std::fs::read_to_string(dir.join(GITIGNORE)).expect("gitignore");
        assert_eq!(gitignore, "hidden.env\n");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn generate_codeship_ignores_token_file() {
        let server = MockServer::start_async().await;
        serve_environment(&server).await;
        let dir = logged_in_dir("generate-codeship");
        std::fs::write(dir.join(GITIGNORE), "target").expect("gitignore");
        let ctx = context(&server.base_url(), dir.clone(), ScriptedPrompter::new(&[], true));

        run_generate(
            &ctx,
            &GenerateArgs {
                shipment: "mss-web".to_string(),
                env: "dev".to_string(),
                build_provider: "codeship".to_string(),
            },
        )
        .await
        .expect("generate");

        let gitignore = std::fs::read_to_string(dir.join(GITIGNORE)).expect("gitignore");
        assert_eq!(gitignore, "target\nhidden.env\ncodeship.env\n");
        let token = std::fs::read_to_string(dir.join("codeship.env")).expect("codeship env");
        assert_eq!(token, "MSS_WEB_DEV_TOKEN=build-secret\n");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_build_provider_fails_before_any_request() {
        let dir = temp_dir("generate-unknown");
        let ctx = context("http://127.0.0.1:9", dir.clone(), ScriptedPrompter::new(&[], true));

        let err = run_generate(
            &ctx,
            &GenerateArgs {
                shipment: "mss-web".to_string(),
                env: "dev".to_string(),
                build_provider: "jenkins".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("jenkins"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn init_prompts_for_missing_answers() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/groups/mss/barges");
                then.status(200).json_body(json!({"barges": [{"name": "digital-sandbox"}]}));
            })
            .await;
        let dir = temp_dir("init");
        // name, env (default), group, barge (hint), replicas, port, healthcheck
        let prompter = ScriptedPrompter::new(&["mss-web", "", "mss", "", "", "3000", ""], true);
        let ctx = context(&server.base_url(), dir.clone(), prompter);

        run_init(&ctx, &InitArgs::default()).await.expect("init");

        let harbor = HarborCompose::from_yaml(
            &std::fs::read_to_string(dir.join(HARBOR_COMPOSE_FILE)).expect("harbor"),
        )
        .expect("parse harbor");
        let shipment = &harbor.shipments["mss-web"];
        assert_eq!(shipment.env, "dev");
        assert_eq!(shipment.barge, "digital-sandbox");
        assert_eq!(shipment.replicas, 2);
        let compose = DockerCompose::from_yaml(
            &std::fs::read_to_string(dir.join(DOCKER_COMPOSE_FILE)).expect("docker"),
        )
        .expect("parse docker");
        let web = compose.service("mss-web").expect("service");
        assert_eq!(web.ports, vec!["80:3000"]);
        assert_eq!(web.image, "mss-web:0.1.0");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn migrate_combines_barge_settings_and_flags() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/barges/sandbox");
                then.status(200).json_body(json!({
                    "name": "sandbox",
                    "awsAccountId": "123456789012",
                    "region": "us-east-1",
                    "vpc": "vpc-1",
                    "privateSubnets": ["subnet-a"],
                    "publicSubnets": ["subnet-b"]
                }));
            })
            .await;
        let dir = temp_dir("migrate");
        std::fs::write(
            dir.join(DOCKER_COMPOSE_FILE),
            "version: \"2\"\nservices:\n  web:\n    image: web:1.0.0\n    ports:\n      - \"80:3000\"\n    environment:\n      HEALTHCHECK: /health\n",
        )
        .expect("docker");
        std::fs::write(
            dir.join(HARBOR_COMPOSE_FILE),
            "shipments:\n  mss-web:\n    env: dev\n    barge: sandbox\n    containers: [web]\n    replicas: 2\n    group: mss\n",
        )
        .expect("harbor");
        let ctx = context(&server.base_url(), dir.clone(), ScriptedPrompter::new(&[], true));

        run_migrate(
            &ctx,
            &MigrateArgs {
                files: ComposeFileArgs::default(),
                platform: ECS_FARGATE_PLATFORM.to_string(),
                account_id: String::new(),
                role: "devops".to_string(),
                region: String::new(),
                profile: String::new(),
                vpc: String::new(),
                private_subnets: String::new(),
                public_subnets: String::new(),
            },
        )
        .await
        .expect("migrate");

        let tfvars = std::fs::read_to_string(dir.join("infrastructure/env/dev/terraform.tfvars"))
            .expect("tfvars");
        assert!(tfvars.contains("saml_role = \"devops\""));
        assert!(tfvars.contains("region = \"us-east-1\""));
        let script = std::fs::read_to_string(dir.join("migrate.sh")).expect("script");
        assert!(script.contains("account 123456789012"));
        let compose = DockerCompose::from_yaml(
            &std::fs::read_to_string(dir.join(DOCKER_COMPOSE_FILE)).expect("docker"),
        )
        .expect("parse docker");
        assert_eq!(compose.service("web").expect("web").ports, vec!["3000:3000"]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn migrate_rejects_unknown_platform() {
        let dir = temp_dir("migrate-platform");
        let ctx = context("http://127.0.0.1:9", dir.clone(), ScriptedPrompter::new(&[], true));
        let args = MigrateArgs {
            files: ComposeFileArgs::default(),
            platform: "kubernetes".to_string(),
            account_id: String::new(),
            role: String::new(),
            region: String::new(),
            profile: String::new(),
            vpc: String::new(),
            private_subnets: String::new(),
            public_subnets: String::new(),
        };

        let err = run_migrate(&ctx, &args).await.unwrap_err();
        assert!(err.to_string().contains("unsupported platform kubernetes"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn terraform_writes_main_tf() {
        let server = MockServer::start_async().await;
        serve_environment(&server).await;
        let dir = logged_in_dir("terraform");
        let ctx = context(&server.base_url(), dir.clone(), ScriptedPrompter::new(&[], true));

        run_terraform(
            &ctx,
            &TerraformArgs {
                shipment: "mss-web".to_string(),
                env: "dev".to_string(),
            },
        )
        .await
        .expect("terraform");

        let main = std::fs::read_to_string(dir.join("main.tf")).expect("main.tf");
        assert!(main.contains("resource \"harbor_shipment\" \"app\""));
        let _ = std::fs::remove_dir_all(dir);
    }
}
