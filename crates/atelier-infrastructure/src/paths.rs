//! Path management and confinement for the Atelier stores.
//!
//! Two concerns live here: resolving the platform directories Atelier keeps
//! its data in, and the confinement primitive every store operation funnels
//! through before touching the filesystem.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/atelier/           # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/atelier/      # Data directory
//! └── sessions/                # Session store root ({base})
//!     ├── _agent_configs/      # Global agent configs: {agent_id}.json
//!     └── {session_id}/
//!         ├── session_manifest.json
//!         ├── data/            # File workspace root (user content)
//!         └── _agents/         # Local agent configs: {agent_id}.json
//! ```

use atelier_core::error::{AtelierError, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Manifest file name inside each session directory.
pub const SESSION_MANIFEST: &str = "session_manifest.json";
/// File workspace subdirectory inside each session directory.
pub const DATA_DIR: &str = "data";
/// Local agent config subdirectory inside each session directory.
pub const LOCAL_AGENTS_DIR: &str = "_agents";
/// Global agent config directory name, reserved at the store root.
pub const GLOBAL_AGENTS_DIR: &str = "_agent_configs";
/// Active session pointer file at the store root.
pub const ACTIVE_SESSION_FILE: &str = "active_session.txt";

/// Errors that can occur during platform path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified platform path management for atelier.
pub struct AtelierPaths;

impl AtelierPaths {
    /// Returns the atelier configuration directory (e.g. `~/.config/atelier/`).
    pub fn config_dir() -> std::result::Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("atelier"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the atelier data directory (e.g. `~/.local/share/atelier/`).
    pub fn data_dir() -> std::result::Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join("atelier"))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> std::result::Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the default session store root.
    pub fn sessions_dir() -> std::result::Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("sessions"))
    }
}

/// Validates an identifier used as a path segment (session id, agent id).
///
/// # Errors
///
/// Returns `InvalidIdentifier` if the id is empty or contains `..`, `/`,
/// or `\`. Called before any path is built from the id.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(AtelierError::invalid_identifier(id));
    }
    Ok(())
}

/// Resolves a caller-supplied relative path to an absolute path confined to
/// `root`.
///
/// `relative` may be empty or "." (meaning the root itself). Leading path
/// separators are stripped so an absolute input cannot override the root.
/// The path is normalized lexically (`.` dropped, `..` applied within the
/// relative part only), joined onto the canonicalized root, and resolved
/// through its deepest existing ancestor so symlinks cannot smuggle the
/// result outside. The final check is component-aware
/// (`Path::starts_with`), not a string prefix.
///
/// # Errors
///
/// - `AccessDenied` if the resolved path would lie outside `root`
/// - `Io` if `root` itself cannot be canonicalized
pub async fn confine(root: &Path, relative: &str) -> Result<PathBuf> {
    let canonical_root = fs::canonicalize(root).await.map_err(|e| {
        AtelierError::io(format!(
            "failed to canonicalize confinement root '{}': {}",
            root.display(),
            e
        ))
    })?;

    // Treat the input as relative no matter how it is spelled.
    let stripped = relative.trim().trim_start_matches(['/', '\\']);

    let mut normalized = PathBuf::new();
    for component in Path::new(stripped).components() {
        match component {
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    // More `..` than depth: this can only point outside.
                    return Err(AtelierError::access_denied(format!(
                        "path '{relative}' escapes the workspace root"
                    )));
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    let candidate = canonical_root.join(&normalized);

    // Resolve symlinks through the deepest ancestor that exists; the part
    // that does not exist yet cannot contain `..` after normalization.
    let mut existing = candidate.clone();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match fs::canonicalize(&existing).await {
            Ok(resolved) => {
                let mut resolved = resolved;
                for part in remainder.iter().rev() {
                    resolved.push(part);
                }
                if !resolved.starts_with(&canonical_root) {
                    return Err(AtelierError::access_denied(format!(
                        "path '{relative}' escapes the workspace root"
                    )));
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) => {
                        remainder.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => {
                        return Err(AtelierError::access_denied(format!(
                            "path '{relative}' escapes the workspace root"
                        )));
                    }
                }
            }
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to resolve '{}': {}",
                    existing.display(),
                    e
                )));
            }
        }
    }
}
