//! Filesystem-backed session repository.
//!
//! Each session occupies one directory under the store root, named by its id:
//!
//! ```text
//! {base}/{session_id}/
//! ├── session_manifest.json
//! ├── data/        # file workspace root
//! └── _agents/     # session-local agent configs
//! ```
//!
//! A session with no readable manifest is indistinguishable from one that
//! does not exist. Every successful `get` refreshes `last_accessed` and
//! persists the refresh before returning, so reads have a write side effect.

use crate::paths::{
    ACTIVE_SESSION_FILE, AtelierPaths, DATA_DIR, GLOBAL_AGENTS_DIR, LOCAL_AGENTS_DIR,
    SESSION_MANIFEST, validate_identifier,
};
use async_trait::async_trait;
use atelier_core::error::{AtelierError, Result};
use atelier_core::session::{
    NewSession, Session, SessionPatch, SessionRepository, validate_session_description,
    validate_session_name,
};
use atelier_core::sync::KeyedLocks;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Filesystem-backed session repository.
pub struct FsSessionRepository {
    base_dir: PathBuf,
    locks: KeyedLocks,
}

impl FsSessionRepository {
    /// Creates a repository rooted at `base_dir`, creating the root if
    /// necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to create session store root '{}': {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            base_dir,
            locks: KeyedLocks::new(),
        })
    }

    /// Creates a repository at the default platform location
    /// (`~/.local/share/atelier/sessions`).
    pub async fn default_location() -> Result<Self> {
        let base_dir = AtelierPaths::sessions_dir()
            .map_err(|e| AtelierError::io(format!("failed to resolve session store root: {e}")))?;
        Self::new(base_dir).await
    }

    /// Returns the store root all session directories live under.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(session_id)
    }

    fn manifest_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(SESSION_MANIFEST)
    }

    /// Reads a session manifest.
    ///
    /// Missing, unreadable, and unparseable manifests all read as `None`:
    /// a session without a usable manifest does not exist. Corruption is
    /// logged so it is not entirely silent.
    async fn read_manifest(&self, session_id: &str) -> Option<Session> {
        let path = self.manifest_path(session_id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    "failed to read session manifest '{}': {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&json) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    "corrupt session manifest '{}', treating as absent: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        // The manifest must agree with the directory it lives in.
        if session.session_id != session_id {
            tracing::warn!(
                "session manifest '{}' claims id '{}', treating as absent",
                path.display(),
                session.session_id
            );
            return None;
        }

        Some(session)
    }

    async fn write_manifest(&self, session: &Session) -> Result<()> {
        let path = self.manifest_path(&session.session_id);
        let json = serde_json::to_string_pretty(session)?;

        fs::write(&path, json).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to write session manifest '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Loads a session and persists a refreshed `last_accessed`.
    ///
    /// Callers must hold the session's keyed lock; this is the shared body
    /// of `get` and `update`.
    async fn touch_and_load(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.read_manifest(session_id).await else {
            return Ok(None);
        };

        session.last_accessed = Utc::now().to_rfc3339();
        self.write_manifest(&session).await?;

        Ok(Some(session))
    }
}

#[async_trait]
impl SessionRepository for FsSessionRepository {
    async fn create(&self, new: NewSession) -> Result<Session> {
        validate_session_name(&new.name)?;
        validate_session_description(new.description.as_deref())?;

        let session_id = Uuid::new_v4().to_string();
        let session_dir = self.session_dir(&session_id);

        // Fail-if-exists so an id collision is detected, never overwritten.
        fs::create_dir(&session_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                AtelierError::already_exists("session", session_id.clone())
            } else {
                AtelierError::io(format!(
                    "failed to create session directory '{}': {}",
                    session_dir.display(),
                    e
                ))
            }
        })?;

        let populate = async {
            fs::create_dir(session_dir.join(DATA_DIR)).await.map_err(|e| {
                AtelierError::io(format!("failed to create session data directory: {e}"))
            })?;
            fs::create_dir(session_dir.join(LOCAL_AGENTS_DIR))
                .await
                .map_err(|e| {
                    AtelierError::io(format!("failed to create session agents directory: {e}"))
                })?;

            let now = Utc::now().to_rfc3339();
            let session = Session {
                session_id: session_id.clone(),
                name: new.name,
                description: new.description,
                created_at: now.clone(),
                last_accessed: now,
            };
            self.write_manifest(&session).await?;
            Ok(session)
        };

        match populate.await {
            Ok(session) => Ok(session),
            Err(e) => {
                // A half-created session must not become visible.
                if let Err(cleanup) = fs::remove_dir_all(&session_dir).await {
                    tracing::warn!(
                        "failed to clean up partial session directory '{}': {}",
                        session_dir.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        validate_identifier(session_id)?;

        let _guard = self.locks.acquire(session_id).await;
        self.touch_and_load(session_id).await
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to list session store root '{}': {}",
                    self.base_dir.display(),
                    e
                )));
            }
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AtelierError::io(format!("failed to enumerate session directories: {e}"))
        })? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };
            if !file_type.is_dir() {
                continue;
            }
            let Some(session_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if session_id == GLOBAL_AGENTS_DIR {
                continue;
            }

            match self.get(&session_id).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("skipping unreadable session '{}': {}", session_id, e);
                }
            }
        }

        // Most recently accessed first.
        sessions.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));

        Ok(sessions)
    }

    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        validate_identifier(session_id)?;
        if let Some(name) = patch.name.as_deref() {
            validate_session_name(name)?;
        }
        validate_session_description(patch.description.as_deref())?;

        let _guard = self.locks.acquire(session_id).await;

        let Some(mut session) = self.touch_and_load(session_id).await? else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            session.name = name;
        }
        if let Some(description) = patch.description {
            session.description = Some(description);
        }

        self.write_manifest(&session).await?;
        Ok(Some(session))
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        validate_identifier(session_id)?;

        let _guard = self.locks.acquire(session_id).await;

        let session_dir = self.session_dir(session_id);
        match fs::remove_dir_all(&session_dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(AtelierError::io(format!(
                "failed to delete session directory '{}': {}",
                session_dir.display(),
                e
            ))),
        }
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        validate_identifier(session_id)?;

        match fs::try_exists(self.manifest_path(session_id)).await {
            Ok(exists) => Ok(exists),
            Err(e) => Err(AtelierError::io(format!(
                "failed to check session '{session_id}': {e}"
            ))),
        }
    }

    async fn get_active_session_id(&self) -> Result<Option<String>> {
        let active_file = self.base_dir.join(ACTIVE_SESSION_FILE);

        let content = match fs::read_to_string(&active_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to read active session file: {e}"
                )));
            }
        };

        let session_id = content.trim().to_string();
        if session_id.is_empty() || !self.exists(&session_id).await.unwrap_or(false) {
            return Ok(None);
        }

        Ok(Some(session_id))
    }

    async fn set_active_session_id(&self, session_id: &str) -> Result<()> {
        validate_identifier(session_id)?;

        let active_file = self.base_dir.join(ACTIVE_SESSION_FILE);
        fs::write(&active_file, session_id).await.map_err(|e| {
            AtelierError::io(format!("failed to write active session file: {e}"))
        })
    }
}
