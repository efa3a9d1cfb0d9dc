//! Filesystem accessor for a session's `data/` subtree.
//!
//! Every operation validates the session id, requires the session to exist,
//! and resolves the caller's relative path through [`crate::paths::confine`]
//! before any filesystem action. Paths returned to callers are relative to
//! the data root and forward-slash separated on every platform.

use crate::paths::{DATA_DIR, confine, validate_identifier};
use async_trait::async_trait;
use atelier_core::error::{AtelierError, Result};
use atelier_core::files::{FileEncoding, FileEntry, WorkspaceFiles};
use atelier_core::session::SessionRepository;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Filesystem-backed workspace file accessor.
pub struct FsWorkspaceFiles {
    base_dir: PathBuf,
    sessions: Arc<dyn SessionRepository>,
}

impl FsWorkspaceFiles {
    pub fn new(base_dir: impl AsRef<Path>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            sessions,
        }
    }

    /// Returns the canonicalized data root of an existing session.
    async fn data_root(&self, session_id: &str) -> Result<PathBuf> {
        validate_identifier(session_id)?;
        if !self.sessions.exists(session_id).await? {
            return Err(AtelierError::not_found("session", session_id));
        }

        let root = self.base_dir.join(session_id).join(DATA_DIR);
        fs::canonicalize(&root).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to resolve data root '{}': {}",
                root.display(),
                e
            ))
        })
    }

    /// The caller-facing relative path of `path` under `root`, forward-slash
    /// separated.
    fn relative_path(root: &Path, path: &Path) -> String {
        path.strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn entry_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    async fn entry_for(root: &Path, path: &Path) -> Result<FileEntry> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| AtelierError::io(format!("failed to stat '{}': {}", path.display(), e)))?;

        let modified_at = metadata
            .modified()
            .ok()
            .map(|time| DateTime::<Utc>::from(time).to_rfc3339());

        Ok(FileEntry {
            name: Self::entry_name(path),
            path: Self::relative_path(root, path),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() {
                None
            } else {
                Some(metadata.len())
            },
            modified_at,
        })
    }

    /// Creates `path`'s parents, rejecting a parent segment that is a file.
    async fn ensure_parent_dirs(path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };

        match fs::metadata(parent).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(AtelierError::validation(format!(
                "parent path '{}' is not a directory",
                parent.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(parent).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotADirectory
                        || e.kind() == std::io::ErrorKind::AlreadyExists
                    {
                        AtelierError::validation(format!(
                            "a parent segment of '{}' is not a directory",
                            path.display()
                        ))
                    } else {
                        AtelierError::io(format!(
                            "failed to create parent directories for '{}': {}",
                            path.display(),
                            e
                        ))
                    }
                })
            }
            Err(e) => Err(AtelierError::io(format!(
                "failed to stat parent of '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Guards operations that must not target the data root itself.
    fn reject_root(target: &Path, root: &Path, relative: &str) -> Result<()> {
        if target == root {
            return Err(AtelierError::validation(format!(
                "operation not allowed on the workspace root (path '{relative}')"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl WorkspaceFiles for FsWorkspaceFiles {
    async fn list(&self, session_id: &str, path: &str) -> Result<Vec<FileEntry>> {
        let root = self.data_root(session_id).await?;
        let target = confine(&root, path).await?;

        let mut read_dir = match fs::read_dir(&target).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AtelierError::not_found("path", path));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => {
                return Err(AtelierError::validation(format!(
                    "path '{path}' is not a directory"
                )));
            }
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to list '{}': {}",
                    target.display(),
                    e
                )));
            }
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| AtelierError::io(format!("failed to enumerate '{path}': {e}")))?
        {
            match Self::entry_for(&root, &entry.path()).await {
                Ok(file_entry) => entries.push(file_entry),
                Err(e) => {
                    tracing::warn!(
                        "skipping unreadable entry '{}': {}",
                        entry.path().display(),
                        e
                    );
                }
            }
        }

        // Directories first, then case-insensitive by name.
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        Ok(entries)
    }

    async fn read(&self, session_id: &str, path: &str, encoding: FileEncoding) -> Result<String> {
        let root = self.data_root(session_id).await?;
        let target = confine(&root, path).await?;

        let metadata = match fs::metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AtelierError::not_found("path", path));
            }
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to stat '{}': {}",
                    target.display(),
                    e
                )));
            }
        };
        if metadata.is_dir() {
            return Err(AtelierError::validation(format!(
                "path '{path}' is a directory"
            )));
        }

        let bytes = fs::read(&target).await.map_err(|e| {
            AtelierError::io(format!("failed to read '{}': {}", target.display(), e))
        })?;

        match encoding {
            FileEncoding::Utf8 => String::from_utf8(bytes).map_err(|_| {
                AtelierError::validation(format!("file '{path}' is not valid UTF-8 text"))
            }),
            FileEncoding::Base64 => Ok(BASE64_STANDARD.encode(bytes)),
        }
    }

    async fn write(
        &self,
        session_id: &str,
        path: &str,
        content: &str,
        encoding: FileEncoding,
    ) -> Result<FileEntry> {
        let root = self.data_root(session_id).await?;
        let target = confine(&root, path).await?;
        Self::reject_root(&target, &root, path)?;

        if let Ok(metadata) = fs::metadata(&target).await {
            if metadata.is_dir() {
                return Err(AtelierError::validation(format!(
                    "path '{path}' is a directory"
                )));
            }
        }

        let bytes = match encoding {
            FileEncoding::Utf8 => content.as_bytes().to_vec(),
            FileEncoding::Base64 => BASE64_STANDARD.decode(content).map_err(|e| {
                AtelierError::validation(format!("content for '{path}' is not valid base64: {e}"))
            })?,
        };

        Self::ensure_parent_dirs(&target).await?;
        fs::write(&target, bytes).await.map_err(|e| {
            AtelierError::io(format!("failed to write '{}': {}", target.display(), e))
        })?;

        Self::entry_for(&root, &target).await
    }

    async fn delete(&self, session_id: &str, path: &str) -> Result<bool> {
        let root = self.data_root(session_id).await?;
        let target = confine(&root, path).await?;
        Self::reject_root(&target, &root, path)?;

        let metadata = match fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to stat '{}': {}",
                    target.display(),
                    e
                )));
            }
        };

        let removal = if metadata.is_dir() {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };
        match removal {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(AtelierError::io(format!(
                "failed to delete '{}': {}",
                target.display(),
                e
            ))),
        }
    }

    async fn mkdir(&self, session_id: &str, path: &str) -> Result<FileEntry> {
        let root = self.data_root(session_id).await?;
        let target = confine(&root, path).await?;

        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_dir() => {
                // Idempotent: the directory is already there.
                return Self::entry_for(&root, &target).await;
            }
            Ok(_) => {
                return Err(AtelierError::already_exists("file", path));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to stat '{}': {}",
                    target.display(),
                    e
                )));
            }
        }

        fs::create_dir_all(&target).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotADirectory
                || e.kind() == std::io::ErrorKind::AlreadyExists
            {
                AtelierError::validation(format!(
                    "a parent segment of '{path}' is not a directory"
                ))
            } else {
                AtelierError::io(format!(
                    "failed to create directory '{}': {}",
                    target.display(),
                    e
                ))
            }
        })?;

        Self::entry_for(&root, &target).await
    }

    async fn rename(&self, session_id: &str, src: &str, dst: &str) -> Result<FileEntry> {
        let root = self.data_root(session_id).await?;
        let source = confine(&root, src).await?;
        let destination = confine(&root, dst).await?;
        Self::reject_root(&source, &root, src)?;
        Self::reject_root(&destination, &root, dst)?;

        if fs::symlink_metadata(&source).await.is_err() {
            return Err(AtelierError::not_found("path", src));
        }
        if fs::symlink_metadata(&destination).await.is_ok() {
            return Err(AtelierError::already_exists("path", dst));
        }

        Self::ensure_parent_dirs(&destination).await?;
        fs::rename(&source, &destination).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to move '{}' to '{}': {}",
                source.display(),
                destination.display(),
                e
            ))
        })?;

        Self::entry_for(&root, &destination).await
    }
}
