//! Filesystem abstractions used for reading compose files and writing artifacts.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::provider::Artifact;

/// Abstraction over filesystem access for testability.
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem {
    /// Whether a file exists at the path.
    fn exists(&self, path: &Path) -> bool;
    /// Read a file into a string.
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write a file, creating parent directories and applying the unix mode.
    fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<()>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Create a new standard filesystem adapter.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write_file(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = create_with_mode(path, mode)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}

/// Open `path` for writing with `mode` applied before any contents land.
#[cfg(unix)]
fn create_with_mode(path: &Path, mode: u32) -> Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    // Existing files keep their old mode through `open`.
    file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_with_mode(path: &Path, _mode: u32) -> Result<File> {
    Ok(OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}

/// Result of attempting to write an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The artifact was written.
    Written,
    /// The file existed and the overwrite was declined.
    Skipped,
}

/// Write an artifact below `root`, asking before replacing an existing file.
pub fn write_artifact<F, C>(
    fs: &F,
    root: &Path,
    artifact: &Artifact,
    mut confirm_overwrite: C,
) -> Result<WriteOutcome>
where
    F: FileSystem + ?Sized,
    C: FnMut(&Path) -> Result<bool>,
{
    let path = root.join(&artifact.path);
    if fs.exists(&path) && !confirm_overwrite(&path)? {
        log::info!("skipped {}", path.display());
        return Ok(WriteOutcome::Skipped);
    }
    fs.write_file(&path, &artifact.contents, artifact.mode)?;
    log::info!("wrote {}", path.display());
    Ok(WriteOutcome::Written)
}

/// Append `line` to the file at `path` unless a line with the same content exists.
///
/// Returns true when the file changed.
pub fn ensure_line<F: FileSystem + ?Sized>(fs: &F, path: &Path, line: &str) -> Result<bool> {
    let existing = if fs.exists(path) {
        fs.read_to_string(path)?
    } else {
        String::new()
    };
    if existing.lines().any(|candidate| candidate.trim() == line) {
        return Ok(false);
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(line);
    updated.push('\n');
    fs.write_file(path, &updated, 0o644)?;
    Ok(true)
}
