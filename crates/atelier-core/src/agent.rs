//! Agent configuration domain model.
//!
//! An agent configuration is a named, reusable recipe for invoking an
//! LLM-driven task: which model to use, how to prompt it, which tools it may
//! call. Configurations live in two independent namespaces: a global one
//! shared by all sessions, and a local one nested inside a single session.

use crate::error::{AtelierError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored agent configuration.
///
/// `created_at` is preserved across saves of the same record; `updated_at`
/// is refreshed on every save. On first save both are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agent_type: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub llm_model_id: String,
    #[serde(default)]
    pub llm_params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub max_steps: Option<u32>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl AgentConfig {
    /// The timestamp listings sort by: `updated_at`, falling back to
    /// `created_at` for records written before updates were stamped.
    pub fn sort_stamp(&self) -> &str {
        if self.updated_at.is_empty() {
            &self.created_at
        } else {
            &self.updated_at
        }
    }
}

/// Caller-supplied fields of an agent configuration; timestamps are owned by
/// the repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfigDraft {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agent_type: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub llm_model_id: String,
    #[serde(default)]
    pub llm_params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub max_steps: Option<u32>,
}

impl AgentConfigDraft {
    /// Validates the caller-controlled fields.
    ///
    /// # Errors
    ///
    /// - `Validation` if `name` or `llm_model_id` is empty
    /// - `Validation` if `max_steps` is present but zero
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AtelierError::validation("agent name must not be empty"));
        }
        if self.llm_model_id.is_empty() {
            return Err(AtelierError::validation(
                "agent llm_model_id must not be empty",
            ));
        }
        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err(AtelierError::validation("max_steps must be positive"));
            }
        }
        Ok(())
    }
}

/// The namespace an agent configuration lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    /// Shared across all sessions.
    Global,
    /// Nested inside one session; exists only while the session does.
    Local { session_id: String },
}

impl ConfigScope {
    pub fn local(session_id: impl Into<String>) -> Self {
        Self::Local {
            session_id: session_id.into(),
        }
    }
}

/// Repository for scoped agent configurations.
///
/// A given `agent_id` may have at most one global record and, independently,
/// at most one local record per session. The two are fully separate storage
/// slots.
#[async_trait]
pub trait AgentConfigRepository: Send + Sync {
    /// Creates or updates a record in the given scope.
    ///
    /// On update the prior record's `created_at` is preserved and
    /// `updated_at` is refreshed; on first save both are set equal.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentifier` for a malformed `agent_id`
    /// - `Validation` if the draft fails field validation
    /// - `NotFound` when saving into the local scope of a missing session
    async fn save(&self, scope: &ConfigScope, draft: AgentConfigDraft) -> Result<AgentConfig>;

    /// Reads a record from the given scope. Corrupt records read as absent.
    async fn get(&self, scope: &ConfigScope, agent_id: &str) -> Result<Option<AgentConfig>>;

    /// Lists all records in the given scope, most recently updated first.
    /// Corrupt or identity-mismatched records are skipped.
    async fn list(&self, scope: &ConfigScope) -> Result<Vec<AgentConfig>>;

    /// Deletes a record. Returns `Ok(false)` when it did not exist.
    async fn delete(&self, scope: &ConfigScope, agent_id: &str) -> Result<bool>;

    /// Resolves the effective configuration for an agent.
    ///
    /// When `session_id` is given, the session exists, and a local record
    /// exists, the local record wins; otherwise the global record is used.
    /// Failures probing the local side fall back to the global record.
    async fn resolve_effective(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<AgentConfig>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AgentConfigDraft {
        AgentConfigDraft {
            agent_id: "a1".to_string(),
            name: "Research".to_string(),
            agent_type: "chat".to_string(),
            llm_model_id: "m1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate().is_ok());

        let mut no_name = draft();
        no_name.name.clear();
        assert!(no_name.validate().is_err());

        let mut no_model = draft();
        no_model.llm_model_id.clear();
        assert!(no_model.validate().is_err());

        let mut zero_steps = draft();
        zero_steps.max_steps = Some(0);
        assert!(zero_steps.validate().is_err());

        let mut some_steps = draft();
        some_steps.max_steps = Some(8);
        assert!(some_steps.validate().is_ok());
    }

    #[test]
    fn test_sort_stamp_falls_back_to_created_at() {
        let mut config = AgentConfig {
            agent_id: "a1".to_string(),
            name: "X".to_string(),
            description: String::new(),
            agent_type: "chat".to_string(),
            system_prompt: None,
            llm_model_id: "m".to_string(),
            llm_params: HashMap::new(),
            tools: vec![],
            max_steps: None,
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: String::new(),
        };
        assert_eq!(config.sort_stamp(), "2024-01-01T00:00:00+00:00");

        config.updated_at = "2024-02-01T00:00:00+00:00".to_string();
        assert_eq!(config.sort_stamp(), "2024-02-01T00:00:00+00:00");
    }

    #[test]
    fn test_config_tolerates_minimal_record() {
        let json = r#"{
            "agent_id": "a1",
            "name": "X",
            "agent_type": "chat",
            "llm_model_id": "m",
            "created_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let parsed: AgentConfig = serde_json::from_str(json).unwrap();
        assert!(parsed.llm_params.is_empty());
        assert!(parsed.tools.is_empty());
        assert_eq!(parsed.max_steps, None);
        assert_eq!(parsed.sort_stamp(), parsed.created_at);
    }
}
