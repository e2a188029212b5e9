#![deny(missing_docs)]
//! harbor-compose core library.
//!
//! This crate holds the platform data model, the shipment/compose
//! transformations and the artifact generators used by the
//! `harbor-compose` command line tool.

pub mod compose;
pub mod envvars;
pub mod error;
pub mod fargate;
pub mod fs;
pub mod image;
/// CI build providers.
pub mod pipelines;
pub mod provider;
pub mod scaffold;
pub mod shipment;
pub mod template;
pub mod terraform;
pub mod transform;

pub use compose::{
    ComposeShipment, DOCKER_COMPOSE_FILE, DockerCompose, DockerComposeService, HARBOR_COMPOSE_FILE,
    HIDDEN_ENV_FILE, HarborCompose, format_env_file, interpolate, parse_env_file,
};
pub use envvars::{ClassifiedEnvVars, RESTART_MARKER, escape_dollars, unescape_dollars};
pub use error::{HarborComposeError, Result};
pub use fargate::{ECS_FARGATE_PLATFORM, FargateOptions, fargate_artifacts};
pub use fs::{FileSystem, StdFileSystem, WriteOutcome, ensure_line, write_artifact};
pub use image::ImageRef;
pub use provider::{Artifact, BUILD_PROVIDERS, BuildProvider, build_provider, build_token_env_var};
pub use scaffold::{InitOptions, scaffold};
pub use shipment::{
    ContainerPayload, EC2_PROVIDER, EnvVarPayload, EnvVarType, ParentShipment, PortPayload,
    ProviderPayload, ShipmentEnvironment,
};
pub use template::{TemplateContext, render};
pub use terraform::terraform_artifacts;
pub use transform::{ComposeProjection, compose_to_shipment, shipment_to_compose};
