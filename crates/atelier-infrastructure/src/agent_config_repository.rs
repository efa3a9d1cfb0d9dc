//! Filesystem-backed scoped agent configuration repository.
//!
//! One JSON file per record, named `{agent_id}.json`. The global namespace
//! is a flat directory reserved at the store root; the local namespace is
//! nested inside each session directory and lives and dies with the session:
//!
//! ```text
//! {base}/_agent_configs/{agent_id}.json     # global scope
//! {base}/{session_id}/_agents/{agent_id}.json   # local scope
//! ```
//!
//! Saves are read-modify-write under a per-record keyed lock so the prior
//! record's `created_at` survives concurrent writers.

use crate::paths::{GLOBAL_AGENTS_DIR, LOCAL_AGENTS_DIR, validate_identifier};
use async_trait::async_trait;
use atelier_core::agent::{AgentConfig, AgentConfigDraft, AgentConfigRepository, ConfigScope};
use atelier_core::error::{AtelierError, Result};
use atelier_core::session::SessionRepository;
use atelier_core::sync::KeyedLocks;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Filesystem-backed agent configuration repository.
///
/// The session repository is injected so the local scope can verify its
/// session exists without reaching into session internals.
pub struct FsAgentConfigRepository {
    base_dir: PathBuf,
    sessions: Arc<dyn SessionRepository>,
    locks: KeyedLocks,
}

impl FsAgentConfigRepository {
    /// Creates a repository over the same store root as the session
    /// repository, creating the global config directory if necessary.
    pub async fn new(
        base_dir: impl AsRef<Path>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        let global_dir = base_dir.join(GLOBAL_AGENTS_DIR);
        fs::create_dir_all(&global_dir).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to create global agent config directory '{}': {}",
                global_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            base_dir,
            sessions,
            locks: KeyedLocks::new(),
        })
    }

    fn scope_dir(&self, scope: &ConfigScope) -> PathBuf {
        match scope {
            ConfigScope::Global => self.base_dir.join(GLOBAL_AGENTS_DIR),
            ConfigScope::Local { session_id } => {
                self.base_dir.join(session_id).join(LOCAL_AGENTS_DIR)
            }
        }
    }

    fn record_path(&self, scope: &ConfigScope, agent_id: &str) -> PathBuf {
        self.scope_dir(scope).join(format!("{agent_id}.json"))
    }

    fn lock_key(scope: &ConfigScope, agent_id: &str) -> String {
        match scope {
            ConfigScope::Global => format!("global/{agent_id}"),
            ConfigScope::Local { session_id } => format!("local/{session_id}/{agent_id}"),
        }
    }

    /// Validates the ids a scope touches before any path is built from them.
    fn validate_scope(scope: &ConfigScope, agent_id: &str) -> Result<()> {
        validate_identifier(agent_id)?;
        if let ConfigScope::Local { session_id } = scope {
            validate_identifier(session_id)?;
        }
        Ok(())
    }

    /// Reads one record. Corruption and identity mismatch read as absent,
    /// with a warning.
    async fn read_record(&self, path: &Path, agent_id: &str) -> Option<AgentConfig> {
        let json = match fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read agent config '{}': {}", path.display(), e);
                return None;
            }
        };

        let config: AgentConfig = match serde_json::from_str(&json) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "corrupt agent config '{}', treating as absent: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        if config.agent_id != agent_id {
            tracing::warn!(
                "agent config '{}' claims id '{}', treating as absent",
                path.display(),
                config.agent_id
            );
            return None;
        }

        Some(config)
    }

    async fn write_record(&self, path: &Path, config: &AgentConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        fs::write(path, json).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to write agent config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Local-scope lookup used by effective-config resolution. Any failure
    /// is an `Err` so the caller can decide to fall back.
    async fn local_lookup(&self, session_id: &str, agent_id: &str) -> Result<Option<AgentConfig>> {
        validate_identifier(session_id)?;
        if !self.sessions.exists(session_id).await? {
            return Ok(None);
        }
        let scope = ConfigScope::local(session_id);
        Ok(self
            .read_record(&self.record_path(&scope, agent_id), agent_id)
            .await)
    }
}

#[async_trait]
impl AgentConfigRepository for FsAgentConfigRepository {
    async fn save(&self, scope: &ConfigScope, draft: AgentConfigDraft) -> Result<AgentConfig> {
        Self::validate_scope(scope, &draft.agent_id)?;
        draft.validate()?;

        // A local record may only exist inside a live session.
        if let ConfigScope::Local { session_id } = scope {
            if !self.sessions.exists(session_id).await? {
                return Err(AtelierError::not_found("session", session_id.clone()));
            }
        }

        let _guard = self.locks.acquire(&Self::lock_key(scope, &draft.agent_id)).await;

        let path = self.record_path(scope, &draft.agent_id);
        let existing = self.read_record(&path, &draft.agent_id).await;

        let now = Utc::now().to_rfc3339();
        let created_at = existing.map(|prior| prior.created_at).unwrap_or_else(|| now.clone());

        let config = AgentConfig {
            agent_id: draft.agent_id,
            name: draft.name,
            description: draft.description,
            agent_type: draft.agent_type,
            system_prompt: draft.system_prompt,
            llm_model_id: draft.llm_model_id,
            llm_params: draft.llm_params,
            tools: draft.tools,
            max_steps: draft.max_steps,
            created_at,
            updated_at: now,
        };

        let dir = self.scope_dir(scope);
        fs::create_dir_all(&dir).await.map_err(|e| {
            AtelierError::io(format!(
                "failed to create agent config directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        self.write_record(&path, &config).await?;

        Ok(config)
    }

    async fn get(&self, scope: &ConfigScope, agent_id: &str) -> Result<Option<AgentConfig>> {
        Self::validate_scope(scope, agent_id)?;
        Ok(self
            .read_record(&self.record_path(scope, agent_id), agent_id)
            .await)
    }

    async fn list(&self, scope: &ConfigScope) -> Result<Vec<AgentConfig>> {
        if let ConfigScope::Local { session_id } = scope {
            validate_identifier(session_id)?;
        }

        let dir = self.scope_dir(scope);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AtelierError::io(format!(
                    "failed to list agent config directory '{}': {}",
                    dir.display(),
                    e
                )));
            }
        };

        let mut configs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AtelierError::io(format!("failed to enumerate agent configs: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(agent_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Some(config) = self.read_record(&path, agent_id).await {
                configs.push(config);
            }
        }

        // Most recently updated first; records without an update stamp sort
        // by creation time.
        configs.sort_by(|a, b| b.sort_stamp().cmp(a.sort_stamp()));

        Ok(configs)
    }

    async fn delete(&self, scope: &ConfigScope, agent_id: &str) -> Result<bool> {
        Self::validate_scope(scope, agent_id)?;

        let _guard = self.locks.acquire(&Self::lock_key(scope, agent_id)).await;

        let path = self.record_path(scope, agent_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AtelierError::io(format!(
                "failed to delete agent config '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    async fn resolve_effective(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<AgentConfig>> {
        validate_identifier(agent_id)?;

        if let Some(session_id) = session_id {
            match self.local_lookup(session_id, agent_id).await {
                Ok(Some(config)) => return Ok(Some(config)),
                Ok(None) => {}
                Err(e) => {
                    // Local-probe failures fall back to the global record.
                    tracing::debug!(
                        "local config lookup failed for agent '{}' in session '{}', \
                         falling back to global: {}",
                        agent_id,
                        session_id,
                        e
                    );
                }
            }
        }

        self.get(&ConfigScope::Global, agent_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_repository::FsSessionRepository;
    use atelier_core::session::NewSession;
    use tempfile::TempDir;

    async fn fixtures(temp_dir: &TempDir) -> (Arc<FsSessionRepository>, FsAgentConfigRepository) {
        let sessions = Arc::new(FsSessionRepository::new(temp_dir.path()).await.unwrap());
        let configs = FsAgentConfigRepository::new(temp_dir.path(), sessions.clone())
            .await
            .unwrap();
        (sessions, configs)
    }

    fn draft(agent_id: &str, name: &str) -> AgentConfigDraft {
        AgentConfigDraft {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            agent_type: "chat".to_string(),
            llm_model_id: "m".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_global_then_list_has_one_entry() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        configs
            .save(&ConfigScope::Global, draft("a1", "X"))
            .await
            .unwrap();

        let listed = configs.list(&ConfigScope::Global).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].agent_id, "a1");
        assert_eq!(listed[0].name, "X");
        assert!(
            temp_dir
                .path()
                .join(GLOBAL_AGENTS_DIR)
                .join("a1.json")
                .is_file()
        );
    }

    #[tokio::test]
    async fn test_first_save_sets_equal_timestamps() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        let saved = configs
            .save(&ConfigScope::Global, draft("a1", "X"))
            .await
            .unwrap();
        assert_eq!(saved.created_at, saved.updated_at);
    }

    #[tokio::test]
    async fn test_resave_preserves_created_at_and_bumps_updated_at() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        let first = configs
            .save(&ConfigScope::Global, draft("a1", "X"))
            .await
            .unwrap();
        let second = configs
            .save(&ConfigScope::Global, draft("a1", "Renamed"))
            .await
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.name, "Renamed");
    }

    #[tokio::test]
    async fn test_save_local_requires_session() {
        let temp_dir = TempDir::new().unwrap();
        let (sessions, configs) = fixtures(&temp_dir).await;

        let missing = ConfigScope::local("0c9d5a1e-0000-0000-0000-000000000000");
        let err = configs
            .save(&missing, draft("a1", "X"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let session = sessions
            .create(NewSession {
                name: "Demo".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let scope = ConfigScope::local(&session.session_id);
        configs.save(&scope, draft("a1", "X")).await.unwrap();

        assert!(
            temp_dir
                .path()
                .join(&session.session_id)
                .join(LOCAL_AGENTS_DIR)
                .join("a1.json")
                .is_file()
        );
    }

    #[tokio::test]
    async fn test_global_and_local_are_independent_slots() {
        let temp_dir = TempDir::new().unwrap();
        let (sessions, configs) = fixtures(&temp_dir).await;

        let session = sessions
            .create(NewSession {
                name: "Demo".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let local = ConfigScope::local(&session.session_id);

        configs
            .save(&ConfigScope::Global, draft("a1", "Global"))
            .await
            .unwrap();
        configs.save(&local, draft("a1", "Local")).await.unwrap();

        let global = configs.get(&ConfigScope::Global, "a1").await.unwrap().unwrap();
        let local_record = configs.get(&local, "a1").await.unwrap().unwrap();
        assert_eq!(global.name, "Global");
        assert_eq!(local_record.name, "Local");

        assert!(configs.delete(&local, "a1").await.unwrap());
        assert!(configs.get(&ConfigScope::Global, "a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        assert!(!configs.delete(&ConfigScope::Global, "ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_bad_ids_and_fields() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        let err = configs
            .save(&ConfigScope::Global, draft("../evil", "X"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_identifier());

        let mut zero_steps = draft("a1", "X");
        zero_steps.max_steps = Some(0);
        let err = configs
            .save(&ConfigScope::Global, zero_steps)
            .await
            .unwrap_err();
        assert!(matches!(err, AtelierError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_and_mismatched_records() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        let good = configs
            .save(&ConfigScope::Global, draft("good", "X"))
            .await
            .unwrap();

        let global_dir = temp_dir.path().join(GLOBAL_AGENTS_DIR);
        std::fs::write(global_dir.join("corrupt.json"), "{not json").unwrap();
        // Internal id disagrees with the filename.
        let mut forged = good.clone();
        forged.agent_id = "good".to_string();
        std::fs::write(
            global_dir.join("mismatched.json"),
            serde_json::to_string_pretty(&forged).unwrap(),
        )
        .unwrap();
        // Non-JSON files are ignored entirely.
        std::fs::write(global_dir.join("README.txt"), "notes").unwrap();

        let listed = configs.list(&ConfigScope::Global).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].agent_id, "good");
    }

    #[tokio::test]
    async fn test_list_sorts_by_update_stamp_descending() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        configs
            .save(&ConfigScope::Global, draft("older", "X"))
            .await
            .unwrap();
        configs
            .save(&ConfigScope::Global, draft("newer", "Y"))
            .await
            .unwrap();
        // Re-save bumps "older" to the top.
        configs
            .save(&ConfigScope::Global, draft("older", "X2"))
            .await
            .unwrap();

        let listed = configs.list(&ConfigScope::Global).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["older", "newer"]);
    }

    #[tokio::test]
    async fn test_resolve_prefers_local_over_global() {
        let temp_dir = TempDir::new().unwrap();
        let (sessions, configs) = fixtures(&temp_dir).await;

        let session = sessions
            .create(NewSession {
                name: "Demo".to_string(),
                description: None,
            })
            .await
            .unwrap();

        configs
            .save(&ConfigScope::Global, draft("a1", "Global"))
            .await
            .unwrap();
        configs
            .save(&ConfigScope::local(&session.session_id), draft("a1", "Local"))
            .await
            .unwrap();

        let effective = configs
            .resolve_effective("a1", Some(&session.session_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(effective.name, "Local");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_global() {
        let temp_dir = TempDir::new().unwrap();
        let (sessions, configs) = fixtures(&temp_dir).await;

        let session = sessions
            .create(NewSession {
                name: "Demo".to_string(),
                description: None,
            })
            .await
            .unwrap();

        configs
            .save(&ConfigScope::Global, draft("a1", "Global"))
            .await
            .unwrap();

        // No local record for the session.
        let effective = configs
            .resolve_effective("a1", Some(&session.session_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(effective.name, "Global");

        // A missing session behaves as "no local override", not an error.
        let effective = configs
            .resolve_effective("a1", Some("0c9d5a1e-0000-0000-0000-000000000000"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(effective.name, "Global");

        // So does a malformed session id.
        let effective = configs
            .resolve_effective("a1", Some("../evil"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(effective.name, "Global");
    }

    #[tokio::test]
    async fn test_resolve_with_no_records_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let (_sessions, configs) = fixtures(&temp_dir).await;

        assert!(configs.resolve_effective("ghost", None).await.unwrap().is_none());
    }
}
