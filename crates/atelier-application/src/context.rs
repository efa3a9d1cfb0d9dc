//! Application context and lifecycle.
//!
//! Every service is constructed explicitly here and shared through `Arc`s;
//! nothing is a global. Request handlers receive a reference to the context
//! and reach stores and the model manager through it.

use anyhow::Context as _;
use atelier_core::error::Result;
use atelier_core::session::SessionRepository;
use atelier_engine::{EngineRegistry, ModelManager};
use atelier_infrastructure::{
    AppConfig, ConfigService, FsAgentConfigRepository, FsSessionRepository, FsWorkspaceFiles,
};
use std::sync::Arc;

/// The wired-up application: stores, file accessor, and model manager over
/// one configured base directory.
pub struct AppContext {
    config: AppConfig,
    sessions: Arc<FsSessionRepository>,
    agent_configs: Arc<FsAgentConfigRepository>,
    workspace_files: Arc<FsWorkspaceFiles>,
    models: Arc<ModelManager>,
}

impl AppContext {
    /// Builds the context from an explicit configuration: resolves the base
    /// directory, initializes the stores, and resolves the engine backend
    /// tag into the closed registry.
    pub async fn startup(config: AppConfig) -> Result<Self> {
        let base_dir = config.resolve_base_dir()?;
        tracing::info!("starting atelier, session store at '{}'", base_dir.display());

        let sessions = Arc::new(FsSessionRepository::new(&base_dir).await?);
        let session_repository: Arc<dyn SessionRepository> = sessions.clone();
        let agent_configs = Arc::new(
            FsAgentConfigRepository::new(&base_dir, session_repository.clone()).await?,
        );
        let workspace_files = Arc::new(FsWorkspaceFiles::new(&base_dir, session_repository));

        let registry = EngineRegistry::from_tag(&config.engine_backend)?;
        let models = Arc::new(ModelManager::new(registry));

        Ok(Self {
            config,
            sessions,
            agent_configs,
            workspace_files,
            models,
        })
    }

    /// Builds the context from the configuration file at the platform
    /// default location.
    pub async fn startup_default() -> anyhow::Result<Self> {
        let config = ConfigService::new()
            .get_config()
            .await
            .context("failed to load application configuration")?;
        Self::startup(config)
            .await
            .context("failed to start application context")
    }

    /// Drains in-flight model state before the process exits. Store
    /// operations need no draining: each one is a single filesystem
    /// transaction awaited by its caller.
    pub async fn shutdown(&self) {
        let unloaded = self.models.unload_all().await;
        tracing::info!("shutdown complete, {} model(s) unloaded", unloaded);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<FsSessionRepository> {
        &self.sessions
    }

    pub fn agent_configs(&self) -> &Arc<FsAgentConfigRepository> {
        &self.agent_configs
    }

    pub fn workspace_files(&self) -> &Arc<FsWorkspaceFiles> {
        &self.workspace_files
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    /// Builds the agent chat use case over this context's services.
    pub fn agent_chat(&self) -> crate::agent_service::AgentChatService {
        crate::agent_service::AgentChatService::new(self.agent_configs.clone(), self.models.clone())
    }
}

/// Initializes the global tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
