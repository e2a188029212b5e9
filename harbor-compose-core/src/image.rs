//! Docker image reference parsing.

use std::fmt;

/// Tag used when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// A parsed `repo:version-prerelease` image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Repository including any registry host.
    pub repo: String,
    /// Version with any prerelease suffix removed.
    pub version: String,
    /// Prerelease suffix after the first `-`, if any.
    pub prerelease: Option<String>,
}

impl ImageRef {
    /// Parse an image reference.
    ///
    /// The tag is whatever follows the last `:` after the final `/`, so
    /// registry ports (`host:5000/app`) are not mistaken for tags.
    pub fn parse(image: &str) -> Self {
        let image = image.trim();
        let name_start = image.rfind('/').map(|idx| idx + 1).unwrap_or(0);
        let (repo, tag) = match image[name_start..].rfind(':') {
            Some(idx) => {
                let split = name_start + idx;
                (&image[..split], &image[split + 1..])
            }
            None => (image, ""),
        };
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        let (version, prerelease) = match tag.split_once('-') {
            Some((version, prerelease)) => (version, Some(prerelease.to_string())),
            None => (tag, None),
        };
        Self {
            repo: repo.to_string(),
            version: version.to_string(),
            prerelease,
        }
    }

    /// Full tag including the prerelease suffix.
    pub fn tag(&self) -> String {
        match &self.prerelease {
            Some(prerelease) => format!("{}-{prerelease}", self.version),
            None => self.version.clone(),
        }
    }

    /// Image reference whose tag is `<version>-<build>`.
    pub fn with_build_suffix(&self, build: &str) -> String {
        format!("{}:{}-{build}", self.repo, self.version)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag())
    }
}
