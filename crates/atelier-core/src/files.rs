//! Workspace file access model.
//!
//! Every session owns a `data/` subtree; all file operations are confined to
//! it. Paths exchanged with callers are relative to the data root and use
//! forward slashes regardless of platform.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Content encoding for workspace file reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEncoding {
    /// Content is the file's bytes interpreted as UTF-8 text.
    #[default]
    Utf8,
    /// Content is the base64 encoding of the file's raw bytes.
    Base64,
}

/// One entry of a workspace directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Final path component.
    pub name: String,
    /// Path relative to the session's data root, forward-slash separated.
    pub path: String,
    pub is_dir: bool,
    /// Size in bytes; `None` for directories.
    pub size: Option<u64>,
    /// Last modification time, RFC-3339 UTC, when available.
    pub modified_at: Option<String>,
}

/// File operations inside a single session's data subtree.
///
/// Every operation takes the session id and a relative path; implementations
/// must reject any path that resolves outside the session's data root with
/// `AccessDenied` before touching the filesystem beyond it.
#[async_trait]
pub trait WorkspaceFiles: Send + Sync {
    /// Lists a directory. Entries are sorted directories-first, then by
    /// case-insensitive name. `path` may be empty or "." for the root.
    async fn list(&self, session_id: &str, path: &str) -> Result<Vec<FileEntry>>;

    /// Reads a file's content in the requested encoding.
    async fn read(&self, session_id: &str, path: &str, encoding: FileEncoding) -> Result<String>;

    /// Writes a file, creating parent directories as needed. Fails if a
    /// parent path segment is already a file.
    async fn write(
        &self,
        session_id: &str,
        path: &str,
        content: &str,
        encoding: FileEncoding,
    ) -> Result<FileEntry>;

    /// Deletes a file or directory (recursively). Idempotent: returns
    /// `Ok(true)` whether or not the path existed.
    async fn delete(&self, session_id: &str, path: &str) -> Result<bool>;

    /// Creates a directory (and parents). Idempotent if the target is
    /// already a directory; fails with `AlreadyExists` if it is a file.
    async fn mkdir(&self, session_id: &str, path: &str) -> Result<FileEntry>;

    /// Moves `src` to `dst`. Fails if `src` is missing or `dst` exists;
    /// `dst`'s parent directories are created as needed.
    async fn rename(&self, session_id: &str, src: &str, dst: &str) -> Result<FileEntry>;
}
