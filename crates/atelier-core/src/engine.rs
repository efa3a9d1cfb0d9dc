//! Collaborator contracts for external engines.
//!
//! The inference engine, container engine, and terminal relay are opaque
//! collaborators: Atelier only depends on the narrow traits defined here.
//! Wire protocols, image management, and model discovery live behind the
//! implementations.

use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;

/// Lifecycle states of a registered model.
///
/// Transitions: `Unknown -> Loading -> {Loaded | Error}`;
/// `Loaded -> Unloading -> {removed | Error}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelStatus {
    Unknown,
    Loading,
    Loaded,
    Unloading,
    Unloaded,
    Error,
}

/// Status record for one registered model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_id: String,
    pub status: ModelStatus,
    /// Failure message when `status` is `Error`.
    #[serde(default)]
    pub error: Option<String>,
    /// RFC-3339 UTC timestamp of the successful load.
    #[serde(default)]
    pub loaded_at: Option<String>,
}

impl ModelRecord {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            status: ModelStatus::Unknown,
            error: None,
            loaded_at: None,
        }
    }
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A complete (non-streamed) chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub content: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One incremental chunk of a streamed chat completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub delta: String,
    pub finished: bool,
}

/// Stream of chat chunks. Errors are forwarded as items; the end of the
/// stream is the completion sentinel.
pub type ChatChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// Contract of a wrapped LLM inference backend.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Loads the model this engine instance will serve.
    async fn load(
        &self,
        model_path: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// Releases the loaded model and its resources.
    async fn unload(&self) -> Result<()>;

    /// Runs a chat completion to the end.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatCompletion>;

    /// Runs a chat completion as a chunk stream.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatChunkStream>;
}

/// Specification for creating a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub command: Vec<String>,
}

/// Status and resource usage of a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub handle: String,
    pub state: String,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_bytes: Option<u64>,
}

/// Contract of a wrapped container orchestration backend.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;
    async fn start(&self, handle: &str) -> Result<()>;
    async fn stop(&self, handle: &str) -> Result<()>;
    async fn delete(&self, handle: &str) -> Result<()>;
    async fn info(&self, handle: &str) -> Result<ContainerInfo>;
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

/// Contract of a PTY byte-stream relay.
#[async_trait]
pub trait TerminalRelay: Send + Sync {
    async fn spawn(&self, command: &str, cwd: &Path, size: TerminalSize) -> Result<String>;
    async fn read(&self, handle: &str) -> Result<Vec<u8>>;
    async fn write(&self, handle: &str, data: &[u8]) -> Result<()>;
    async fn resize(&self, handle: &str, size: TerminalSize) -> Result<()>;
}
