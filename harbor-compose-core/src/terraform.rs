//! Terraform source for managing a shipment with the harbor provider.

use crate::envvars::ClassifiedEnvVars;
use crate::error::{HarborComposeError, Result};
use crate::provider::Artifact;
use crate::shipment::{ContainerPayload, EC2_PROVIDER, PortPayload, ShipmentEnvironment};
use crate::template::{TemplateContext, render};

/// File written by [`terraform_artifacts`].
pub const TERRAFORM_MAIN_FILE: &str = "main.tf";

/// Render `main.tf` describing a shipment environment.
pub fn terraform_artifacts(env: &ShipmentEnvironment) -> Result<Vec<Artifact>> {
    let shipment = &env.parent_shipment;
    let ec2 = env.provider(EC2_PROVIDER).ok_or_else(|| {
        HarborComposeError::validation(format!(
            "shipment {} environment {} has no {EC2_PROVIDER} provider",
            shipment.name, env.name
        ))
    })?;

    // Log-shipping settings are configured on the environment, not the shipment.
    let logs = ClassifiedEnvVars::from_vars(&env.env_vars).log_shipping;
    let log_value = |name: &str| -> String {
        logs.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| hcl_escape(&crate::envvars::unescape_dollars(value)))
            .unwrap_or_default()
    };

    let containers = env
        .containers
        .iter()
        .map(container_block)
        .collect::<Vec<_>>()
        .join("\n");

    let context = TemplateContext::new()
        .with("SHIPMENT", hcl_escape(&shipment.name))
        .with("GROUP", hcl_escape(&shipment.group))
        .with("ENV", hcl_escape(&env.name))
        .with("RESOURCE", resource_name(&env.name))
        .with("BARGE", hcl_escape(&ec2.barge))
        .with("REPLICAS", ec2.replicas.to_string())
        .with("MONITORED", env.enable_monitoring.to_string())
        .with("IAM_ROLE", hcl_escape(&env.iam_role))
        .with("CONTAINERS", containers)
        .with("SHIP_LOGS", log_value("SHIP_LOGS"))
        .with("LOGS_ENDPOINT", log_value("LOGS_ENDPOINT"))
        .with("LOGS_DOMAIN_NAME", log_value("LOGS_DOMAIN_NAME"))
        .with("LOGS_REGION", log_value("LOGS_REGION"))
        .with("LOGS_QUEUE_NAME", log_value("LOGS_QUEUE_NAME"));

    Ok(vec![Artifact::new(
        TERRAFORM_MAIN_FILE,
        render(&main_template(), &context)?,
    )])
}

fn container_block(container: &ContainerPayload) -> String {
    let mut block = format!(
        "  container {{\n    name = \"{}\"\n",
        hcl_escape(&container.name)
    );
    for port in &container.ports {
        block.push_str(&port_block(port));
    }
    block.push_str("  }");
    block
}

fn port_block(port: &PortPayload) -> String {
    let mut lines = vec![
        "    port {".to_string(),
        format!("      protocol     = \"{}\"", hcl_escape(&port.protocol)),
        format!("      value        = {}", port.value),
        format!("      public_port  = {}", port.effective_public_port()),
        format!("      healthcheck  = \"{}\"", hcl_escape(&port.healthcheck)),
        format!("      primary      = {}", port.primary),
        format!("      public_vip   = {}", port.public_vip),
        format!("      external     = {}", port.external),
    ];
    if let Some(interval) = port.healthcheck_interval {
        lines.push(format!("      healthcheck_interval = {interval}"));
    }
    if let Some(timeout) = port.healthcheck_timeout {
        lines.push(format!("      healthcheck_timeout  = {timeout}"));
    }
    lines.push("    }".to_string());
    let mut block = lines.join("\n");
    block.push('\n');
    block
}

/// Terraform identifiers only allow letters, digits, `_` and `-`, and must
/// start with a letter or `_`.
fn resource_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.chars().next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => cleaned,
        _ => format!("env_{cleaned}"),
    }
}

fn hcl_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "$${")
}

fn main_template() -> String {
    [
        "provider \"harbor\" {",
        "  credential_file = \"~/.harbor/credentials\"",
        "}",
        "",
        "resource \"harbor_shipment\" \"app\" {",
        "  shipment = \"{{SHIPMENT}}\"",
        "  group    = \"{{GROUP}}\"",
        "}",
        "",
        "resource \"harbor_shipment_env\" \"{{RESOURCE}}\" {",
        "  shipment    = \"${harbor_shipment.app.id}\"",
        "  environment = \"{{ENV}}\"",
        "  barge       = \"{{BARGE}}\"",
        "  replicas    = {{REPLICAS}}",
        "  monitored   = {{MONITORED}}{{#if IAM_ROLE}}",
        "  iam_role    = \"{{IAM_ROLE}}\"{{/if}}",
        "{{CONTAINERS}}",
        "{{#if SHIP_LOGS}}  log_shipping {",
        "    provider                = \"{{SHIP_LOGS}}\"",
        "    endpoint                = \"{{LOGS_ENDPOINT}}\"",
        "    domain_name             = \"{{LOGS_DOMAIN_NAME}}\"",
        "    aws_region              = \"{{LOGS_REGION}}\"",
        "    sqs_queue_name          = \"{{LOGS_QUEUE_NAME}}\"",
        "    aws_access_key          = \"${var.logs_access_key}\"",
        "    aws_secret_key          = \"${var.logs_secret_key}\"",
        "  }",
        "{{/if}}}",
        "{{#if SHIP_LOGS}}",
        "variable \"logs_access_key\" {}",
        "",
        "variable \"logs_secret_key\" {}",
        "{{/if}}",
        "output \"dns_name\" {",
        "  value = \"${harbor_shipment_env.{{RESOURCE}}.dns_name}\"",
        "}",
        "",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipment::{EnvVarPayload, ParentShipment, ProviderPayload};

    fn sample_env(env_vars: Vec<EnvVarPayload>) -> ShipmentEnvironment {
        ShipmentEnvironment {
            name: "dev".to_string(),
            enable_monitoring: true,
            parent_shipment: ParentShipment {
                name: "mss-web".to_string(),
                group: "mss".to_string(),
                ..ParentShipment::default()
            },
            env_vars,
            containers: vec![ContainerPayload {
                name: "web".to_string(),
                image: "quay.io/org/web:1.0.0".to_string(),
                ports: vec![PortPayload {
                    value: 3000,
                    protocol: "http".to_string(),
                    public_port: 80,
                    healthcheck: "/health".to_string(),
                    healthcheck_interval: Some(10),
                    primary: true,
                    ..PortPayload::default()
                }],
                env_vars: Vec::new(),
            }],
            providers: vec![ProviderPayload {
                name: EC2_PROVIDER.to_string(),
                replicas: 3,
                barge: "digital-sandbox".to_string(),
                env_vars: Vec::new(),
            }],
            ..ShipmentEnvironment::default()
        }
    }

    #[test]
    fn renders_shipment_environment_and_ports() {
        let artifacts = terraform_artifacts(&sample_env(Vec::new())).expect("terraform");
        assert_eq!(artifacts.len(), 1);
        let main = &artifacts[0].contents;

        assert!(main.contains("resource \"harbor_shipment\" \"app\""));
        assert!(main.contains("resource \"harbor_shipment_env\" \"dev\""));
        assert!(main.contains("barge       = \"digital-sandbox\""));
        assert!(main.contains("replicas    = 3"));
        assert!(main.contains("public_port  = 80"));
        assert!(main.contains("healthcheck_interval = 10"));
        assert!(!main.contains("healthcheck_timeout"));
        assert!(!main.contains("iam_role"));
        assert!(!main.contains("log_shipping"));
        assert!(main.contains("${harbor_shipment_env.dev.dns_name}"));
    }

    #[test]
    fn resource_block_has_no_stray_blank_lines() {
        let plain = &terraform_artifacts(&sample_env(Vec::new())).expect("terraform")[0].contents;
        assert!(plain.contains("  monitored   = true\n  container {\n"));
        assert!(plain.contains("    }\n  }\n}\n\noutput"));

        let mut env = sample_env(Vec::new());
        env.iam_role = "arn:aws:iam::123:role/web".to_string();
        let with_role = &terraform_artifacts(&env).expect("terraform")[0].contents;
        assert!(with_role.contains(
            "  monitored   = true\n  iam_role    = \"arn:aws:iam::123:role/web\"\n  container {\n"
        ));
        assert!(!with_role.contains("\n\n  container"));
    }

    #[test]
    fn numeric_env_names_get_a_valid_resource_name() {
        let mut env = sample_env(Vec::new());
        env.name = "2024-qa".to_string();
        let main = &terraform_artifacts(&env).expect("terraform")[0].contents;
        assert!(main.contains("resource \"harbor_shipment_env\" \"env_2024-qa\""));
        assert!(main.contains("environment = \"2024-qa\""));
    }

    #[test]
    fn ship_logs_adds_log_shipping_block() {
        let env = sample_env(vec![
            EnvVarPayload::basic("SHIP_LOGS", "logzio"),
            EnvVarPayload::basic("logs_endpoint", "https://listener.example.com"),
            EnvVarPayload::hidden("LOGS_SECRET_KEY", "never-rendered"),
        ]);
        let main = &terraform_artifacts(&env).expect("terraform")[0].contents;

        assert!(main.contains("log_shipping {"));
        assert!(main.contains("provider                = \"logzio\""));
        assert!(main.contains("endpoint                = \"https://listener.example.com\""));
        assert!(main.contains("variable \"logs_secret_key\" {}"));
        assert!(!main.contains("never-rendered"));
    }

    #[test]
    fn missing_ec2_provider_is_rejected() {
        let mut env = sample_env(Vec::new());
        env.providers.clear();
        assert!(terraform_artifacts(&env).is_err());
    }

    #[test]
    fn values_are_escaped_for_hcl() {
        assert_eq!(hcl_escape("a\"b${c}"), "a\\\"b$${c}");
        assert_eq!(resource_name("qa.2"), "qa_2");
        assert_eq!(resource_name("1st"), "env_1st");
        assert_eq!(resource_name("_x"), "_x");
    }
}
