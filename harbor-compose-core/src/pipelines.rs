//! CI build providers: CircleCI 1.0, CircleCI 2.0 and Codeship.

use crate::compose::{DockerCompose, HarborCompose};
use crate::error::{HarborComposeError, Result};
use crate::image::ImageRef;
use crate::provider::{Artifact, BuildProvider, build_token_env_var};
use crate::template::{TemplateContext, render};

const CIRCLECI_BUILD_NUMBER: &str = "${CIRCLE_BUILD_NUM}";
const CODESHIP_BUILD_NUMBER: &str = "${CI_BUILD_ID}";

/// Codeship file holding the build token; encrypt it before committing.
pub const CODESHIP_ENV_FILE: &str = "codeship.env";

/// Generates `circle.yml` for CircleCI 1.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct CircleCiV1Provider;

impl BuildProvider for CircleCiV1Provider {
    fn id(&self) -> &str {
        "circleciv1"
    }

    fn provide_artifacts(
        &self,
        compose: &mut DockerCompose,
        harbor: &HarborCompose,
        _token: &str,
    ) -> Result<Vec<Artifact>> {
        let context = ci_context(harbor)?;
        prepare_for_ci(compose, CIRCLECI_BUILD_NUMBER);
        Ok(vec![Artifact::new(
            "circle.yml",
            render(&circleci_v1_template(), &context)?,
        )])
    }
}

/// Generates `.circleci/config.yml` for CircleCI 2.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct CircleCiV2Provider;

impl BuildProvider for CircleCiV2Provider {
    fn id(&self) -> &str {
        "circleciv2"
    }

    fn provide_artifacts(
        &self,
        compose: &mut DockerCompose,
        harbor: &HarborCompose,
        _token: &str,
    ) -> Result<Vec<Artifact>> {
        let context = ci_context(harbor)?;
        prepare_for_ci(compose, CIRCLECI_BUILD_NUMBER);
        Ok(vec![Artifact::new(
            ".circleci/config.yml",
            render(&circleci_v2_template(), &context)?,
        )])
    }
}

/// Generates Codeship services, steps and an env file with the build token.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeshipProvider;

impl BuildProvider for CodeshipProvider {
    fn id(&self) -> &str {
        "codeship"
    }

    fn provide_artifacts(
        &self,
        compose: &mut DockerCompose,
        harbor: &HarborCompose,
        token: &str,
    ) -> Result<Vec<Artifact>> {
        let mut context = ci_context(harbor)?;
        let service = compose.services.keys().next().cloned().ok_or_else(|| {
            HarborComposeError::validation("docker-compose.yml defines no services")
        })?;
        context.insert("SERVICE", service);
        context.insert("TOKEN", token);
        prepare_for_ci(compose, CODESHIP_BUILD_NUMBER);
        Ok(vec![
            Artifact::new(
                "codeship-services.yml",
                render(&codeship_services_template(), &context)?,
            ),
            Artifact::new(
                "codeship-steps.yml",
                render(&codeship_steps_template(), &context)?,
            ),
            Artifact::with_mode(
                CODESHIP_ENV_FILE,
                render("{{TOKEN_VAR}}={{TOKEN}}\n", &context)?,
                0o600,
            ),
        ])
    }

    fn ignored_files(&self) -> Vec<&'static str> {
        vec![CODESHIP_ENV_FILE]
    }
}

fn ci_context(harbor: &HarborCompose) -> Result<TemplateContext> {
    let (name, shipment) = harbor.first_shipment().ok_or_else(|| {
        HarborComposeError::validation("harbor-compose.yml defines no shipments")
    })?;
    Ok(TemplateContext::new()
        .with("SHIPMENT", name)
        .with("ENV", shipment.env.as_str())
        .with("TOKEN_VAR", build_token_env_var(name, &shipment.env)))
}

/// Build every service from the checkout and tag it with the CI build number.
fn prepare_for_ci(compose: &mut DockerCompose, build_number: &str) {
    for service in compose.services.values_mut() {
        service.build = Some(".".to_string());
        if !service.image.is_empty() {
            service.image = ImageRef::parse(&service.image).with_build_suffix(build_number);
        }
        service.ports.clear();
        service.environment.clear();
        service.env_file.clear();
    }
}

fn circleci_v1_template() -> String {
    [
        "machine:",
        "  services:",
        "    - docker",
        "",
        "dependencies:",
        "  override:",
        "    - sudo pip install docker-compose",
        "    - curl -sSL https://github.com/turnerlabs/harbor-compose/releases/latest/download/install.sh | sudo bash",
        "",
        "compile:",
        "  override:",
        "    - docker-compose build",
        "",
        "test:",
        "  override:",
        "    - docker-compose run --rm --entrypoint true {{SHIPMENT}}-test || true",
        "",
        "deployment:",
        "  {{ENV}}:",
        "    branch: master",
        "    commands:",
        "      - docker login -u=\"${REGISTRY_USER}\" -p=\"${REGISTRY_PASS}\" quay.io",
        "      - docker-compose push",
        "      - harbor-compose deploy",
        "",
        "# set {{TOKEN_VAR}} in the project's environment variables",
        "",
    ]
    .join("\n")
}

fn circleci_v2_template() -> String {
    [
        "version: 2",
        "jobs:",
        "  build:",
        "    docker:",
        "      - image: quay.io/turner/harbor-compose:latest",
        "    steps:",
        "      - checkout",
        "      - setup_remote_docker",
        "      - run:",
        "          name: build image",
        "          command: docker-compose build",
        "      - run:",
        "          name: push image",
        "          command: |",
        "            docker login -u=\"${REGISTRY_USER}\" -p=\"${REGISTRY_PASS}\" quay.io",
        "            docker-compose push",
        "      - run:",
        "          name: deploy {{SHIPMENT}} to {{ENV}}",
        "          command: harbor-compose deploy",
        "",
        "workflows:",
        "  version: 2",
        "  build-deploy:",
        "    jobs:",
        "      - build:",
        "          filters:",
        "            branches:",
        "              only: master",
        "",
        "# set {{TOKEN_VAR}} in the project's environment variables",
        "",
    ]
    .join("\n")
}

fn codeship_services_template() -> String {
    [
        "{{SERVICE}}:",
        "  build:",
        "    context: .",
        "    dockerfile: Dockerfile",
        "",
        "harbor-compose:",
        "  image: quay.io/turner/harbor-compose:latest",
        "  encrypted_env_file: codeship.env.encrypted",
        "  add_docker: true",
        "  volumes:",
        "    - ./:/work",
        "  working_dir: /work",
        "",
    ]
    .join("\n")
}

fn codeship_steps_template() -> String {
    [
        "- name: build",
        "  service: {{SERVICE}}",
        "  command: true",
        "",
        "- name: deploy",
        "  tag: master",
        "  service: harbor-compose",
        "  command: sh -c \"docker-compose build && docker-compose push && harbor-compose deploy\"",
        "",
        "# {{SHIPMENT}} {{ENV}} deploys with {{TOKEN_VAR}} from codeship.env.encrypted",
        "",
    ]
    .join("\n")
}
