//! Build providers and the artifacts they generate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compose::{DockerCompose, HarborCompose};
use crate::error::{HarborComposeError, Result};
use crate::pipelines::{CircleCiV1Provider, CircleCiV2Provider, CodeshipProvider};

/// A generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Path relative to the output directory.
    pub path: PathBuf,
    /// File contents.
    pub contents: String,
    /// Unix permission bits.
    pub mode: u32,
}

impl Artifact {
    /// Regular file with mode `0644`.
    pub fn new(path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        Self::with_mode(path, contents, 0o644)
    }

    /// Executable file with mode `0755`.
    pub fn executable(path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        Self::with_mode(path, contents, 0o755)
    }

    /// File with explicit permission bits.
    pub fn with_mode(path: impl AsRef<Path>, contents: impl Into<String>, mode: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            contents: contents.into(),
            mode,
        }
    }
}

/// Something that prepares a project to be built and deployed.
pub trait BuildProvider {
    /// Returns the provider name (e.g., "circleciv2").
    fn id(&self) -> &str;
    /// Render provider files, adjusting the compose model for the provider.
    ///
    /// Callers serialize `compose` only after this returns.
    fn provide_artifacts(
        &self,
        compose: &mut DockerCompose,
        harbor: &HarborCompose,
        token: &str,
    ) -> Result<Vec<Artifact>>;
    /// Generated files that hold secrets and belong in `.gitignore`.
    fn ignored_files(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Leaves the compose model alone and emits nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProvider;

impl BuildProvider for LocalProvider {
    fn id(&self) -> &str {
        "local"
    }

    fn provide_artifacts(
        &self,
        _compose: &mut DockerCompose,
        _harbor: &HarborCompose,
        _token: &str,
    ) -> Result<Vec<Artifact>> {
        Ok(Vec::new())
    }
}

/// Names accepted by [`build_provider`].
pub const BUILD_PROVIDERS: [&str; 5] = ["local", "circleciv1", "circleciv2", "circleci", "codeship"];

/// Look up a build provider by name, case-insensitively.
pub fn build_provider(name: &str) -> Result<Arc<dyn BuildProvider + Send + Sync>> {
    let provider: Arc<dyn BuildProvider + Send + Sync> = match normalize_provider_name(name) {
        Some(ProviderKind::Local) => Arc::new(LocalProvider),
        Some(ProviderKind::CircleCiV1) => Arc::new(CircleCiV1Provider),
        Some(ProviderKind::CircleCiV2) => Arc::new(CircleCiV2Provider),
        Some(ProviderKind::Codeship) => Arc::new(CodeshipProvider),
        None => {
            return Err(HarborComposeError::Other(format!(
                "unknown build provider: {name} (expected one of {})",
                BUILD_PROVIDERS.join(", ")
            )));
        }
    };
    Ok(provider)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ProviderKind {
    Local,
    CircleCiV1,
    CircleCiV2,
    Codeship,
}

fn normalize_provider_name(name: &str) -> Option<ProviderKind> {
    match name.trim().to_lowercase().as_str() {
        "local" => Some(ProviderKind::Local),
        "circleciv1" => Some(ProviderKind::CircleCiV1),
        "circleciv2" | "circleci" => Some(ProviderKind::CircleCiV2),
        "codeship" => Some(ProviderKind::Codeship),
        _ => None,
    }
}

/// Environment variable holding the build token for a shipment environment.
pub fn build_token_env_var(shipment: &str, env: &str) -> String {
    format!("{shipment}_{env}_TOKEN").to_uppercase().replace('-', "_")
}
