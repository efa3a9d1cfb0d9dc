//! Session domain model.
//!
//! A session is an isolated workspace backed by a directory on disk: a JSON
//! manifest describing its identity, a `data/` file tree, and a `_agents/`
//! directory of session-local agent configurations.

use crate::error::{AtelierError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maximum length of a session display name.
pub const SESSION_NAME_MAX: usize = 100;
/// Maximum length of a session description.
pub const SESSION_DESCRIPTION_MAX: usize = 500;

/// Represents one work session as persisted in its manifest.
///
/// The `session_id` is immutable once created and doubles as the directory
/// name on disk. `created_at` is immutable; `last_accessed` is refreshed on
/// every successful read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: String,
    pub last_accessed: String,
}

/// Input for creating a new session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub name: String,
    pub description: Option<String>,
}

/// Partial update for a session. Only fields that are `Some` are applied;
/// identity and `created_at` are never touched.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Validates a session display name against its length bounds.
pub fn validate_session_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > SESSION_NAME_MAX {
        return Err(AtelierError::validation(format!(
            "session name must be 1-{} characters, got {}",
            SESSION_NAME_MAX,
            name.len()
        )));
    }
    Ok(())
}

/// Validates an optional session description against its length bound.
pub fn validate_session_description(description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        if description.len() > SESSION_DESCRIPTION_MAX {
            return Err(AtelierError::validation(format!(
                "session description must be at most {} characters, got {}",
                SESSION_DESCRIPTION_MAX,
                description.len()
            )));
        }
    }
    Ok(())
}

/// Repository for session persistence.
///
/// # Implementation Notes
///
/// Implementations must:
/// - Treat a missing (or unreadable) manifest as "session does not exist"
/// - Refresh `last_accessed` as a side effect of every successful `get`
/// - Serialize concurrent read-modify-write cycles per session id
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a session with a freshly generated id.
    ///
    /// # Errors
    ///
    /// - `Validation` if the name/description bounds are violated
    /// - `AlreadyExists` if the generated id collides with an existing directory
    /// - `Io` if the directory tree or manifest cannot be written
    async fn create(&self, new: NewSession) -> Result<Session>;

    /// Finds a session by id, refreshing its `last_accessed` timestamp.
    ///
    /// Returns `Ok(None)` when the session does not exist. A manifest that
    /// cannot be read or parsed is reported the same way.
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// Lists all sessions, most recently accessed first.
    ///
    /// Entries that cannot be loaded are skipped. A missing store root yields
    /// an empty list.
    async fn list(&self) -> Result<Vec<Session>>;

    /// Applies a partial update, preserving `created_at`.
    ///
    /// Returns `Ok(None)` when the session does not exist.
    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<Option<Session>>;

    /// Removes the session's entire directory subtree.
    ///
    /// Idempotent: returns `Ok(true)` whether or not the session existed.
    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Checks whether a session exists, without touching `last_accessed`.
    async fn exists(&self, session_id: &str) -> Result<bool>;

    /// Returns the id of the active session, if one is set and still exists.
    async fn get_active_session_id(&self) -> Result<Option<String>>;

    /// Marks a session as active.
    async fn set_active_session_id(&self, session_id: &str) -> Result<()>;
}
