use std::collections::BTreeMap;

use harbor_compose_core::{
    ContainerPayload, DockerCompose, EC2_PROVIDER, EnvVarPayload, FargateOptions, HIDDEN_ENV_FILE,
    HarborCompose, ParentShipment, PortPayload, ProviderPayload, RESTART_MARKER,
    ShipmentEnvironment, build_provider, compose_to_shipment, escape_dollars, fargate_artifacts,
    format_env_file, parse_env_file, shipment_to_compose, unescape_dollars,
};

fn web_container(env_vars: Vec<EnvVarPayload>) -> ContainerPayload {
    ContainerPayload {
        name: "web".to_string(),
        image: "quay.io/org/web:1.0.0".to_string(),
        ports: vec![PortPayload {
            value: 3000,
            protocol: "http".to_string(),
            public_port: 80,
            healthcheck: "/health".to_string(),
            primary: true,
            ..PortPayload::default()
        }],
        env_vars,
    }
}

fn worker_container(env_vars: Vec<EnvVarPayload>) -> ContainerPayload {
    ContainerPayload {
        name: "worker".to_string(),
        image: "quay.io/org/worker:1.0.0".to_string(),
        ports: Vec::new(),
        env_vars,
    }
}

/// Serialize a projection and read it back the way `up` sees it after `generate`.
fn reload(env: &ShipmentEnvironment) -> (String, HarborCompose, DockerCompose, BTreeMap<String, String>) {
    let projection = shipment_to_compose(env).expect("projection");
    let docker = DockerCompose::from_yaml(&projection.docker_compose.to_yaml().expect("yaml"))
        .expect("docker");
    let harbor = HarborCompose::from_yaml(&projection.harbor_compose.to_yaml().expect("yaml"))
        .expect("harbor");
    let hidden = parse_env_file(&format_env_file(&projection.hidden_env)).expect("hidden");
    let name = env.parent_shipment.name.clone();
    (name, harbor, docker, hidden)
}

fn shipment(
    shipment_vars: Vec<EnvVarPayload>,
    env_vars: Vec<EnvVarPayload>,
    containers: Vec<ContainerPayload>,
) -> ShipmentEnvironment {
    ShipmentEnvironment {
        name: "dev".to_string(),
        enable_monitoring: true,
        parent_shipment: ParentShipment {
            name: "mss-web".to_string(),
            group: "mss".to_string(),
            env_vars: shipment_vars,
            ..ParentShipment::default()
        },
        env_vars,
        containers,
        providers: vec![ProviderPayload {
            name: EC2_PROVIDER.to_string(),
            replicas: 2,
            barge: "digital-sandbox".to_string(),
            env_vars: Vec::new(),
        }],
        ..ShipmentEnvironment::default()
    }
}

#[test]
fn single_container_with_primary_port() {
    let env = shipment(Vec::new(), Vec::new(), vec![web_container(Vec::new())]);
    let projection = shipment_to_compose(&env).expect("projection");

    let web = projection.docker_compose.service("web").expect("web");
    assert_eq!(web.ports, vec!["80:3000"]);
    assert_eq!(
        web.environment,
        BTreeMap::from([
            ("HEALTHCHECK".to_string(), "/health".to_string()),
            ("PORT".to_string(), "3000".to_string()),
        ])
    );
    assert!(web.env_file.is_empty());
    assert!(projection.hidden_env.is_empty());

    let (name, compose_shipment) = projection.harbor_compose.first_shipment().expect("shipment");
    assert_eq!(name, "mss-web");
    assert_eq!(compose_shipment.barge, "digital-sandbox");
    assert_eq!(compose_shipment.replicas, 2);
    assert_eq!(compose_shipment.containers, vec!["web"]);
}

#[test]
fn container_hidden_var_goes_to_hidden_env() {
    let env = shipment(
        Vec::new(),
        Vec::new(),
        vec![web_container(vec![EnvVarPayload::hidden("DB_PASSWORD", "s3cr$t")])],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    let web = projection.docker_compose.service("web").expect("web");
    assert!(!web.environment.contains_key("DB_PASSWORD"));
    assert_eq!(web.env_file, vec![HIDDEN_ENV_FILE]);
    assert_eq!(projection.hidden_env["DB_PASSWORD"], "s3cr$$t");

    let yaml = projection.docker_compose.to_yaml().expect("yaml");
    assert!(!yaml.contains("s3cr"));
}

#[test]
fn restart_marker_never_reaches_compose_files() {
    let marker = || EnvVarPayload::basic(RESTART_MARKER, "2024-05-01T00:00:00Z");
    let env = shipment(
        vec![marker()],
        vec![marker()],
        vec![web_container(vec![marker()])],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    let docker_yaml = projection.docker_compose.to_yaml().expect("docker yaml");
    let harbor_yaml = projection.harbor_compose.to_yaml().expect("harbor yaml");
    assert!(!docker_yaml.contains(RESTART_MARKER));
    assert!(!harbor_yaml.contains(RESTART_MARKER));
    assert!(!format_env_file(&projection.hidden_env).contains(RESTART_MARKER));
}

#[test]
fn special_vars_are_metadata_not_environment() {
    let env = shipment(
        vec![
            EnvVarPayload::basic("PRODUCT", "video"),
            EnvVarPayload::basic("customer", "cnn"),
        ],
        Vec::new(),
        vec![web_container(Vec::new())],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    let web = projection.docker_compose.service("web").expect("web");
    assert!(!web.environment.contains_key("PRODUCT"));
    assert!(!web.environment.contains_key("customer"));
    let (_, compose_shipment) = projection.harbor_compose.first_shipment().expect("shipment");
    assert_eq!(compose_shipment.product, "video");
}

#[test]
fn later_tiers_override_earlier_ones_and_dollars_are_escaped() {
    let env = shipment(
        vec![EnvVarPayload::basic("LOG_LEVEL", "info")],
        vec![EnvVarPayload::basic("GREETING", "hi $USER")],
        vec![web_container(vec![EnvVarPayload::basic("LOG_LEVEL", "debug")])],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    let web = projection.docker_compose.service("web").expect("web");
    assert_eq!(web.environment["LOG_LEVEL"], "debug");
    assert_eq!(web.environment["GREETING"], "hi $$USER");
}

#[test]
fn log_shipping_stays_out_of_docker_compose() {
    let env = shipment(
        Vec::new(),
        vec![
            EnvVarPayload::basic("SHIP_LOGS", "logzio"),
            EnvVarPayload::basic("LOGS_ENDPOINT", "https://listener"),
        ],
        vec![web_container(Vec::new())],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    let web = projection.docker_compose.service("web").expect("web");
    assert!(!web.environment.contains_key("SHIP_LOGS"));
    let (_, compose_shipment) = projection.harbor_compose.first_shipment().expect("shipment");
    assert_eq!(compose_shipment.environment["SHIP_LOGS"], "logzio");
}

#[test]
fn primary_port_and_ec2_provider_are_required() {
    let mut container = web_container(Vec::new());
    container.ports[0].primary = false;
    let err = shipment_to_compose(&shipment(Vec::new(), Vec::new(), vec![container]))
        .unwrap_err();
    assert!(err.to_string().contains("no primary port"));

    let mut second = web_container(Vec::new());
    second.name = "api".to_string();
    let err = shipment_to_compose(&shipment(
        Vec::new(),
        Vec::new(),
        vec![web_container(Vec::new()), second],
    ))
    .unwrap_err();
    assert!(err.to_string().contains("2 primary ports"));

    let mut env = shipment(Vec::new(), Vec::new(), vec![web_container(Vec::new())]);
    env.providers[0].name = "ecs".to_string();
    let err = shipment_to_compose(&env).unwrap_err();
    assert!(err.to_string().contains("ec2"));
}

#[test]
fn environment_vars_survive_a_round_trip() {
    let env_vars = vec![
        EnvVarPayload::basic("GREETING", "hi $USER"),
        EnvVarPayload::basic("LOG_LEVEL", "info"),
        EnvVarPayload::hidden("API_KEY", "k$y"),
    ];
    let env = shipment(Vec::new(), env_vars, vec![web_container(Vec::new())]);
    let projection = shipment_to_compose(&env).expect("projection");

    // Through YAML and the env file, as `generate` followed by `up` would.
    let docker = DockerCompose::from_yaml(&projection.docker_compose.to_yaml().expect("yaml"))
        .expect("docker");
    let harbor = HarborCompose::from_yaml(&projection.harbor_compose.to_yaml().expect("yaml"))
        .expect("harbor");
    let hidden = parse_env_file(&format_env_file(&projection.hidden_env)).expect("hidden");
    let (name, compose_shipment) = harbor.first_shipment().expect("shipment");

    let rebuilt = compose_to_shipment(name, compose_shipment, &docker, &hidden).expect("rebuilt");

    let basic: BTreeMap<_, _> = rebuilt
        .env_vars
        .iter()
        .filter(|var| var.var_type == harbor_compose_core::EnvVarType::Basic)
        .map(|var| (var.name.as_str(), var.value.as_str()))
        .collect();
    assert_eq!(
        basic,
        BTreeMap::from([("GREETING", "hi $USER"), ("LOG_LEVEL", "info")])
    );
    assert!(
        rebuilt
            .env_vars
            .contains(&EnvVarPayload::hidden("API_KEY", "k$y"))
    );

    let web = &rebuilt.containers[0];
    assert!(web.env_vars.is_empty());
    assert!(web.ports[0].primary);
    assert_eq!(web.ports[0].value, 3000);
    assert_eq!(web.ports[0].public_port, 80);
    assert_eq!(web.ports[0].healthcheck, "/health");
    assert_eq!(rebuilt.provider(EC2_PROVIDER).expect("ec2").replicas, 2);
}

#[test]
fn ci_generation_mutates_compose_before_serialization() {
    let env = shipment(Vec::new(), Vec::new(), vec![web_container(Vec::new())]);
    let mut projection = shipment_to_compose(&env).expect("projection");
    let provider = build_provider("circleci").expect("provider");

    let artifacts = provider
        .provide_artifacts(
            &mut projection.docker_compose,
            &projection.harbor_compose,
            "token",
        )
        .expect("artifacts");

    assert_eq!(artifacts.len(), 1);
    let yaml = projection.docker_compose.to_yaml().expect("yaml");
    assert_eq!(projection.docker_compose.services["web"].build.as_deref(), Some("."));
    assert!(yaml.contains("quay.io/org/web:1.0.0-${CIRCLE_BUILD_NUM}"));
    assert!(!yaml.contains("ports"));
}

#[test]
fn primary_port_survives_when_listed_second() {
    let mut web = web_container(Vec::new());
    web.ports.insert(
        0,
        PortPayload {
            value: 8080,
            protocol: "http".to_string(),
            public_port: 8080,
            ..PortPayload::default()
        },
    );
    let env = shipment(Vec::new(), Vec::new(), vec![web]);
    let (name, harbor, mut docker, hidden) = reload(&env);
    assert_eq!(docker.services["web"].ports, vec!["8080:8080", "80:3000"]);
    assert_eq!(docker.services["web"].environment["PORT"], "3000");

    let compose_shipment = &harbor.shipments[&name];
    let rebuilt = compose_to_shipment(&name, compose_shipment, &docker, &hidden).expect("rebuilt");

    let ports = &rebuilt.containers[0].ports;
    let primary: Vec<u16> = ports.iter().filter(|p| p.primary).map(|p| p.value).collect();
    assert_eq!(primary, vec![3000]);
    assert_eq!(ports[1].healthcheck, "/health");
    assert!(ports[0].healthcheck.is_empty());

    let options = FargateOptions {
        account_id: "123456789012".to_string(),
        role: "devops".to_string(),
        region: "us-east-1".to_string(),
        vpc: "vpc-1".to_string(),
        private_subnets: "subnet-a".to_string(),
        public_subnets: "subnet-b".to_string(),
        ..FargateOptions::default()
    };
    let artifacts =
        fargate_artifacts(&name, compose_shipment, &mut docker, &options).expect("bundle");
    assert!(artifacts[1].contents.contains("container_port = \"3000\""));
}

#[test]
fn dollar_signs_in_secrets_survive_generate_push_pull_and_up() {
    let env = shipment(
        Vec::new(),
        vec![EnvVarPayload::hidden("DB_PASSWORD", "s3cr$t")],
        vec![web_container(vec![EnvVarPayload::hidden("API_KEY", "a$$b")])],
    );
    let (name, harbor, docker, hidden) = reload(&env);
    assert_eq!(hidden["DB_PASSWORD"], "s3cr$$t");

    // `env push` uploads what the file decodes to.
    assert_eq!(unescape_dollars(&hidden["DB_PASSWORD"]), "s3cr$t");
    assert_eq!(unescape_dollars(&hidden["API_KEY"]), "a$$b");

    // `env pull` writes platform values back escaped, and `up` reads them.
    let pulled: BTreeMap<String, String> = [("DB_PASSWORD", "s3cr$t"), ("API_KEY", "a$$b")]
        .into_iter()
        .map(|(name, value)| (name.to_string(), escape_dollars(value)))
        .collect();
    let pulled = parse_env_file(&format_env_file(&pulled)).expect("pulled");
    assert_eq!(pulled, hidden);

    let rebuilt =
        compose_to_shipment(&name, &harbor.shipments[&name], &docker, &pulled).expect("rebuilt");
    assert!(rebuilt.env_vars.contains(&EnvVarPayload::hidden("DB_PASSWORD", "s3cr$t")));
    assert!(rebuilt.env_vars.contains(&EnvVarPayload::hidden("API_KEY", "a$$b")));
}

#[test]
fn containers_may_share_a_hidden_name_with_one_value() {
    let shared = || EnvVarPayload::hidden("API_KEY", "k");
    let env = shipment(
        Vec::new(),
        Vec::new(),
        vec![web_container(vec![shared()]), worker_container(vec![shared()])],
    );
    let projection = shipment_to_compose(&env).expect("projection");

    assert_eq!(projection.hidden_env, BTreeMap::from([("API_KEY".to_string(), "k".to_string())]));
    for service in projection.docker_compose.services.values() {
        assert_eq!(service.env_file, vec![HIDDEN_ENV_FILE]);
    }
}

#[test]
fn conflicting_hidden_values_are_rejected() {
    let env = shipment(
        Vec::new(),
        Vec::new(),
        vec![
            web_container(vec![EnvVarPayload::hidden("API_KEY", "web-key")]),
            worker_container(vec![EnvVarPayload::hidden("API_KEY", "worker-key")]),
        ],
    );
    let err = shipment_to_compose(&env).unwrap_err();
    assert!(err.to_string().contains("API_KEY"));

    let overridden = shipment(
        Vec::new(),
        vec![EnvVarPayload::hidden("API_KEY", "env-key")],
        vec![web_container(vec![EnvVarPayload::hidden("API_KEY", "web-key")])],
    );
    assert!(shipment_to_compose(&overridden).is_err());
}
