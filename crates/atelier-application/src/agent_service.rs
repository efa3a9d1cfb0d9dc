//! Agent chat use case.
//!
//! Resolves the effective agent configuration (local override, then global
//! fallback), makes sure the configured model is loaded, and dispatches the
//! conversation to the model manager. This is the layer request handlers
//! call; it owns no state beyond the injected services.

use atelier_core::agent::AgentConfigRepository;
use atelier_core::engine::{ChatChunkStream, ChatCompletion, ChatMessage};
use atelier_core::error::{AtelierError, Result};
use atelier_engine::{LoadRequest, ModelManager};
use std::sync::Arc;

/// Chat orchestration over agent configurations and the model manager.
pub struct AgentChatService {
    agent_configs: Arc<dyn AgentConfigRepository>,
    models: Arc<ModelManager>,
}

impl AgentChatService {
    pub fn new(agent_configs: Arc<dyn AgentConfigRepository>, models: Arc<ModelManager>) -> Self {
        Self {
            agent_configs,
            models,
        }
    }

    /// Resolves the agent's effective configuration and prepends its system
    /// prompt to the conversation.
    async fn prepare(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<(String, Vec<ChatMessage>, std::collections::HashMap<String, serde_json::Value>)>
    {
        let config = self
            .agent_configs
            .resolve_effective(agent_id, session_id)
            .await?
            .ok_or_else(|| AtelierError::not_found("agent config", agent_id))?;

        let mut conversation = Vec::with_capacity(messages.len() + 1);
        if let Some(system_prompt) = &config.system_prompt {
            conversation.push(ChatMessage::new("system", system_prompt.clone()));
        }
        conversation.extend_from_slice(messages);

        // Make sure the configured model is live; a no-op when it already is.
        self.models
            .load(LoadRequest {
                model_id: config.llm_model_id.clone(),
                model_path: config.llm_model_id.clone(),
                params: config.llm_params.clone(),
            })
            .await?;

        Ok((config.llm_model_id, conversation, config.llm_params))
    }

    /// Runs a chat completion through the agent's effective configuration.
    pub async fn chat(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<ChatCompletion> {
        let (model_id, conversation, params) =
            self.prepare(agent_id, session_id, messages).await?;
        self.models.chat(&model_id, &conversation, &params).await
    }

    /// Runs a streamed chat completion through the agent's effective
    /// configuration.
    pub async fn chat_stream(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<ChatChunkStream> {
        let (model_id, conversation, params) =
            self.prepare(agent_id, session_id, messages).await?;
        self.models.chat_stream(&model_id, &conversation, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::agent::{AgentConfigDraft, ConfigScope};
    use atelier_core::session::{NewSession, SessionRepository};
    use atelier_engine::{EngineKind, EngineRegistry};
    use atelier_infrastructure::{FsAgentConfigRepository, FsSessionRepository};
    use futures::StreamExt;
    use tempfile::TempDir;

    struct Fixture {
        sessions: Arc<FsSessionRepository>,
        configs: Arc<FsAgentConfigRepository>,
        service: AgentChatService,
    }

    async fn fixture(temp_dir: &TempDir) -> Fixture {
        let sessions = Arc::new(FsSessionRepository::new(temp_dir.path()).await.unwrap());
        let configs = Arc::new(
            FsAgentConfigRepository::new(temp_dir.path(), sessions.clone())
                .await
                .unwrap(),
        );
        let models = Arc::new(ModelManager::new(EngineRegistry::new(EngineKind::Mock)));
        let service = AgentChatService::new(configs.clone(), models);
        Fixture {
            sessions,
            configs,
            service,
        }
    }

    fn draft(agent_id: &str, model_id: &str, system_prompt: Option<&str>) -> AgentConfigDraft {
        AgentConfigDraft {
            agent_id: agent_id.to_string(),
            name: agent_id.to_string(),
            agent_type: "chat".to_string(),
            system_prompt: system_prompt.map(str::to_string),
            llm_model_id: model_id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_chat_through_global_config() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = fixture(&temp_dir).await;

        fixture
            .configs
            .save(&ConfigScope::Global, draft("helper", "m1", None))
            .await
            .unwrap();

        let completion = fixture
            .service
            .chat("helper", None, &[ChatMessage::new("user", "hello")])
            .await
            .unwrap();
        assert_eq!(completion.content, "echo: hello");
    }

    #[tokio::test]
    async fn test_chat_uses_local_override() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = fixture(&temp_dir).await;

        let session = fixture
            .sessions
            .create(NewSession {
                name: "Demo".to_string(),
                description: None,
            })
            .await
            .unwrap();

        fixture
            .configs
            .save(&ConfigScope::Global, draft("helper", "global-model", None))
            .await
            .unwrap();
        fixture
            .configs
            .save(
                &ConfigScope::local(&session.session_id),
                draft("helper", "local-model", None),
            )
            .await
            .unwrap();

        fixture
            .service
            .chat(
                "helper",
                Some(&session.session_id),
                &[ChatMessage::new("user", "hi")],
            )
            .await
            .unwrap();

        // The local override's model is the one that got loaded.
        let records = fixture.service.models.list_records().await;
        let ids: Vec<_> = records.iter().map(|r| r.model_id.as_str()).collect();
        assert_eq!(ids, vec!["local-model"]);
    }

    #[tokio::test]
    async fn test_chat_unknown_agent_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = fixture(&temp_dir).await;

        let err = fixture
            .service
            .chat("ghost", None, &[ChatMessage::new("user", "hi")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chat_stream_includes_system_prompt_handling() {
        let temp_dir = TempDir::new().unwrap();
        let fixture = fixture(&temp_dir).await;

        fixture
            .configs
            .save(
                &ConfigScope::Global,
                draft("helper", "m1", Some("be helpful")),
            )
            .await
            .unwrap();

        let mut stream = fixture
            .service
            .chat_stream("helper", None, &[ChatMessage::new("user", "stream")])
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            collected.push_str(&chunk.unwrap().delta);
        }
        // The mock echoes the last user message, untouched by the system turn.
        assert_eq!(collected, "echo: stream");
    }
}
