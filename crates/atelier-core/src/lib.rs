pub mod agent;
pub mod engine;
pub mod error;
pub mod files;
pub mod session;
pub mod sync;

// Re-export common error type
pub use error::{AtelierError, Result};

pub use agent::{AgentConfig, AgentConfigDraft, AgentConfigRepository, ConfigScope};
pub use engine::{
    ChatChunk, ChatChunkStream, ChatCompletion, ChatMessage, ContainerEngine, InferenceEngine,
    ModelRecord, ModelStatus, TerminalRelay,
};
pub use files::{FileEncoding, FileEntry, WorkspaceFiles};
pub use session::{NewSession, Session, SessionPatch, SessionRepository};
pub use sync::KeyedLocks;
