pub mod agent_config_repository;
pub mod config_service;
pub mod paths;
pub mod session_repository;
pub mod workspace_files;

pub use crate::agent_config_repository::FsAgentConfigRepository;
pub use crate::config_service::{AppConfig, ConfigService};
pub use crate::paths::{AtelierPaths, confine, validate_identifier};
pub use crate::session_repository::FsSessionRepository;
pub use crate::workspace_files::FsWorkspaceFiles;
