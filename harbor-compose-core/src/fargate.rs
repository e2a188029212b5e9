//! Migration bundle for moving a shipment to AWS ECS/Fargate.
//!
//! The bundle is a Terraform environment under `infrastructure/env/<env>/`
//! plus a `migrate.sh` script that provisions it and deploys the images
//! described by `docker-compose.yml`.

use std::path::PathBuf;

use crate::compose::{ComposeShipment, DockerCompose, HEALTHCHECK_VAR};
use crate::error::{HarborComposeError, Result};
use crate::provider::Artifact;
use crate::template::{TemplateContext, render};
use crate::transform::{parse_port, primary_port_index};

/// Platform name accepted by `migrate --platform`.
pub const ECS_FARGATE_PLATFORM: &str = "ecsfargate";

/// AWS settings for the target account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FargateOptions {
    /// AWS account id.
    pub account_id: String,
    /// Role assumed to run Terraform.
    pub role: String,
    /// AWS region.
    pub region: String,
    /// Named AWS CLI profile.
    pub profile: String,
    /// VPC id.
    pub vpc: String,
    /// Comma-separated private subnet ids.
    pub private_subnets: String,
    /// Comma-separated public subnet ids.
    pub public_subnets: String,
}

impl FargateOptions {
    /// Overlay non-empty values from `overrides`.
    pub fn overridden_by(&self, overrides: &FargateOptions) -> FargateOptions {
        let pick = |base: &String, over: &String| {
            if over.trim().is_empty() {
                base.clone()
            } else {
                over.clone()
            }
        };
        FargateOptions {
            account_id: pick(&self.account_id, &overrides.account_id),
            role: pick(&self.role, &overrides.role),
            region: pick(&self.region, &overrides.region),
            profile: pick(&self.profile, &overrides.profile),
            vpc: pick(&self.vpc, &overrides.vpc),
            private_subnets: pick(&self.private_subnets, &overrides.private_subnets),
            public_subnets: pick(&self.public_subnets, &overrides.public_subnets),
        }
    }

    fn require_complete(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("account", &self.account_id),
            ("role", &self.role),
            ("region", &self.region),
            ("vpc", &self.vpc),
            ("private-subnets", &self.private_subnets),
            ("public-subnets", &self.public_subnets),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HarborComposeError::validation(format!(
                "missing AWS settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Container that receives load-balanced traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PrimaryService {
    name: String,
    port: u16,
    healthcheck: String,
}

/// Generate the migration bundle and rewrite compose ports to `internal:internal`.
pub fn fargate_artifacts(
    shipment_name: &str,
    shipment: &ComposeShipment,
    compose: &mut DockerCompose,
    options: &FargateOptions,
) -> Result<Vec<Artifact>> {
    options.require_complete()?;
    require_path_safe(&shipment.env)?;
    let primary = primary_service(shipment, compose)?;
    rewrite_ports(compose)?;

    let profile = if options.profile.is_empty() {
        "default"
    } else {
        options.profile.as_str()
    };
    let context = TemplateContext::new()
        .with("APP", shipment_name)
        .with("ENV", shipment.env.as_str())
        .with("GROUP", shipment.group.as_str())
        .with("PRODUCT", shipment.product.as_str())
        .with("PROJECT", shipment.project.as_str())
        .with("PROPERTY", shipment.property.as_str())
        .with("ACCOUNT", options.account_id.as_str())
        .with("ROLE", options.role.as_str())
        .with("REGION", options.region.as_str())
        .with("PROFILE", profile)
        .with("VPC", options.vpc.as_str())
        .with("PRIVATE_SUBNETS", options.private_subnets.as_str())
        .with("PUBLIC_SUBNETS", options.public_subnets.as_str())
        .with("CONTAINER", primary.name.as_str())
        .with("PORT", primary.port.to_string())
        .with("HEALTHCHECK", primary.healthcheck.as_str())
        .with("REPLICAS", shipment.replicas.max(1).to_string());

    let env_dir = PathBuf::from("infrastructure").join("env").join(&shipment.env);
    Ok(vec![
        Artifact::new(env_dir.join("main.tf"), render(&main_template(), &context)?),
        Artifact::new(
            env_dir.join("terraform.tfvars"),
            render(&tfvars_template(), &context)?,
        ),
        Artifact::executable("migrate.sh", render(&script_template(), &context)?),
    ])
}

fn primary_service(shipment: &ComposeShipment, compose: &DockerCompose) -> Result<PrimaryService> {
    for name in &shipment.containers {
        let service = compose.service(name)?;
        let Some(healthcheck) = service.environment.get(HEALTHCHECK_VAR) else {
            continue;
        };
        let ports = service
            .ports
            .iter()
            .map(|mapping| parse_port(mapping))
            .collect::<Result<Vec<_>>>()?;
        let Some(index) = primary_port_index(name, service, &ports)? else {
            continue;
        };
        return Ok(PrimaryService {
            name: name.clone(),
            port: ports[index].value,
            healthcheck: healthcheck.clone(),
        });
    }
    Err(HarborComposeError::validation(format!(
        "no container exposes a port with a {HEALTHCHECK_VAR} variable"
    )))
}

/// The env name becomes a directory under `infrastructure/env`.
fn require_path_safe(env: &str) -> Result<()> {
    let safe = !env.is_empty()
        && env
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if safe {
        Ok(())
    } else {
        Err(HarborComposeError::validation(format!(
            "environment name {env:?} may only use letters, digits, '-' and '_'"
        )))
    }
}

/// Fargate tasks use awsvpc networking, where host and container ports match.
fn rewrite_ports(compose: &mut DockerCompose) -> Result<()> {
    for service in compose.services.values_mut() {
        service.ports = service
            .ports
            .iter()
            .map(|mapping| parse_port(mapping).map(|port| format!("{0}:{0}", port.value)))
            .collect::<Result<Vec<_>>>()?;
    }
    Ok(())
}

fn main_template() -> String {
    [
        "terraform {",
        "  required_version = \">= 0.12\"",
        "",
        "  backend \"s3\" {",
        "    region  = \"{{REGION}}\"",
        "    profile = \"{{PROFILE}}\"",
        "    bucket  = \"tf-state-{{APP}}\"",
        "    key     = \"{{ENV}}.terraform.tfstate\"",
        "  }",
        "}",
        "",
        "provider \"aws\" {",
        "  region  = var.region",
        "  profile = var.aws_profile",
        "}",
        "",
        "variable \"region\" {}",
        "variable \"aws_profile\" {}",
        "variable \"saml_role\" {}",
        "variable \"app\" {}",
        "variable \"environment\" {}",
        "variable \"vpc\" {}",
        "variable \"private_subnets\" {}",
        "variable \"public_subnets\" {}",
        "variable \"container_name\" {}",
        "variable \"container_port\" {}",
        "variable \"health_check\" {}",
        "variable \"replicas\" {}",
        "variable \"tags\" {",
        "  type = map(string)",
        "}",
        "",
        "module \"fargate\" {",
        "  source = \"github.com/turnerlabs/terraform-ecs-fargate//env/dev\"",
        "",
        "  region          = var.region",
        "  aws_profile     = var.aws_profile",
        "  saml_role       = var.saml_role",
        "  app             = var.app",
        "  environment     = var.environment",
        "  vpc             = var.vpc",
        "  private_subnets = var.private_subnets",
        "  public_subnets  = var.public_subnets",
        "  container_name  = var.container_name",
        "  container_port  = var.container_port",
        "  health_check    = var.health_check",
        "  replicas        = var.replicas",
        "  tags            = var.tags",
        "}",
        "",
    ]
    .join("\n")
}

fn tfvars_template() -> String {
    [
        "region = \"{{REGION}}\"",
        "aws_profile = \"{{PROFILE}}\"",
        "saml_role = \"{{ROLE}}\"",
        "app = \"{{APP}}\"",
        "environment = \"{{ENV}}\"",
        "vpc = \"{{VPC}}\"",
        "private_subnets = \"{{PRIVATE_SUBNETS}}\"",
        "public_subnets = \"{{PUBLIC_SUBNETS}}\"",
        "container_name = \"{{CONTAINER}}\"",
        "container_port = \"{{PORT}}\"",
        "health_check = \"{{HEALTHCHECK}}\"",
        "replicas = \"{{REPLICAS}}\"",
        "",
        "tags = {",
        "  application = \"{{APP}}\"",
        "  environment = \"{{ENV}}\"",
        "  team        = \"{{GROUP}}\"",
        "{{#if PRODUCT}}  product     = \"{{PRODUCT}}\"\n{{/if}}{{#if PROJECT}}  project     = \"{{PROJECT}}\"\n{{/if}}{{#if PROPERTY}}  property    = \"{{PROPERTY}}\"\n{{/if}}}",
        "",
    ]
    .join("\n")
}

fn script_template() -> String {
    [
        "#!/bin/bash",
        "set -e",
        "",
        "# provisions {{APP}} ({{ENV}}) in account {{ACCOUNT}} and deploys it",
        "export AWS_PROFILE={{PROFILE}}",
        "export AWS_DEFAULT_REGION={{REGION}}",
        "",
        "pushd infrastructure/env/{{ENV}} > /dev/null",
        "terraform init",
        "terraform apply -auto-approve",
        "popd > /dev/null",
        "",
        "if [ -f hidden.env ]; then",
        "  echo \"hidden.env is not migrated; store its values as secrets for {{APP}}-{{ENV}}\"",
        "fi",
        "",
        "docker-compose build",
        "docker-compose push",
        "fargate service deploy --file docker-compose.yml --cluster {{APP}}-{{ENV}} --service {{APP}}-{{ENV}}",
        "",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::DockerComposeService;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn options() -> FargateOptions {
        FargateOptions {
            account_id: "123456789012".to_string(),
            role: "devops".to_string(),
            region: "us-east-1".to_string(),
            profile: String::new(),
            vpc: "vpc-1".to_string(),
            private_subnets: "subnet-a,subnet-b".to_string(),
            public_subnets: "subnet-c,subnet-d".to_string(),
        }
    }

    fn sample() -> (ComposeShipment, DockerCompose) {
        let shipment = ComposeShipment {
            env: "dev".to_string(),
            barge: "digital-sandbox".to_string(),
            containers: vec!["worker".to_string(), "web".to_string()],
            replicas: 2,
            group: "mss".to_string(),
            product: "web".to_string(),
            ..ComposeShipment::default()
        };
        let mut compose = DockerCompose::default();
        compose.services.insert(
            "web".to_string(),
            DockerComposeService {
                image: "quay.io/org/web:1.0.0".to_string(),
                ports: vec!["80:3000".to_string()],
                environment: BTreeMap::from([
                    ("HEALTHCHECK".to_string(), "/health".to_string()),
                    ("PORT".to_string(), "3000".to_string()),
                ]),
                ..DockerComposeService::default()
            },
        );
        compose.services.insert(
            "worker".to_string(),
            DockerComposeService {
                image: "quay.io/org/worker:1.0.0".to_string(),
                ports: vec!["9000:9090".to_string()],
                ..DockerComposeService::default()
            },
        );
        (shipment, compose)
    }

    #[test]
    fn writes_bundle_and_rewrites_ports() {
        let (shipment, mut compose) = sample();
        let artifacts =
            fargate_artifacts("mss-web", &shipment, &mut compose, &options()).expect("bundle");

        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("infrastructure/env/dev/main.tf"),
                Path::new("infrastructure/env/dev/terraform.tfvars"),
                Path::new("migrate.sh"),
            ]
        );
        assert_eq!(artifacts[2].mode, 0o755);

        let tfvars = &artifacts[1].contents;
        assert!(tfvars.contains("container_name = \"web\""));
        assert!(tfvars.contains("container_port = \"3000\""));
        assert!(tfvars.contains("health_check = \"/health\""));
        assert!(tfvars.contains("aws_profile = \"default\""));
        assert!(tfvars.contains("  product     = \"web\"\n"));
        assert!(!tfvars.contains("project"));

        assert_eq!(compose.services["web"].ports, vec!["3000:3000"]);
        assert_eq!(compose.services["worker"].ports, vec!["9090:9090"]);
    }

    #[test]
    fn flags_override_barge_settings() {
        let barge = options();
        let flags = FargateOptions {
            region: "us-west-2".to_string(),
            ..FargateOptions::default()
        };
        let merged = barge.overridden_by(&flags);
        assert_eq!(merged.region, "us-west-2");
        assert_eq!(merged.account_id, "123456789012");
    }

    #[test]
    fn incomplete_settings_are_reported() {
        let (shipment, mut compose) = sample();
        let err = fargate_artifacts(
            "mss-web",
            &shipment,
            &mut compose,
            &FargateOptions {
                region: "us-east-1".to_string(),
                ..FargateOptions::default()
            },
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("account"));
        assert!(message.contains("vpc"));
        assert!(!message.contains("region"));
    }

    #[test]
    fn container_port_follows_port_variable() {
        let (shipment, mut compose) = sample();
        if let Some(web) = compose.services.get_mut("web") {
            web.ports = vec!["8080:8080".to_string(), "80:3000".to_string()];
        }
        let artifacts =
            fargate_artifacts("mss-web", &shipment, &mut compose, &options()).expect("bundle");

        assert!(artifacts[1].contents.contains("container_port = \"3000\""));
        assert_eq!(compose.services["web"].ports, vec!["8080:8080", "3000:3000"]);
    }

    #[test]
    fn env_names_cannot_leave_the_bundle_directory() {
        for env in ["../prod", "dev/blue", ""] {
            let (mut shipment, mut compose) = sample();
            shipment.env = env.to_string();
            let err = fargate_artifacts("mss-web", &shipment, &mut compose, &options()).unwrap_err();
            assert!(err.to_string().contains("environment name"), "{env}");
        }
    }

    #[test]
    fn needs_a_health_checked_container() {
        let (mut shipment, mut compose) = sample();
        shipment.containers = vec!["worker".to_string()];
        assert!(fargate_artifacts("mss-web", &shipment, &mut compose, &options()).is_err());
    }
}
