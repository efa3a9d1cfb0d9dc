//! Closed registry of inference backends.
//!
//! Which backend serves a model is configured as a string tag; the tag is
//! parsed into [`EngineKind`] once at startup, and everything downstream
//! dispatches on the enum. Adding a backend means adding a variant here and
//! an arm in [`EngineRegistry::build`].

use crate::mock::MockEngine;
use async_trait::async_trait;
use atelier_core::engine::{
    ChatChunkStream, ChatCompletion, ChatMessage, InferenceEngine,
};
use atelier_core::error::{AtelierError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Supported inference backend implementations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum EngineKind {
    /// No backend configured; every model operation fails with a clear error.
    Null,
    /// In-memory echo backend used by tests and local development.
    Mock,
}

/// Backend factory resolved once at startup from the configured tag.
#[derive(Debug, Clone, Copy)]
pub struct EngineRegistry {
    kind: EngineKind,
}

impl EngineRegistry {
    pub fn new(kind: EngineKind) -> Self {
        Self { kind }
    }

    /// Parses a configuration tag into a registry.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a tag that names no known backend.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let kind = tag
            .parse::<EngineKind>()
            .map_err(|_| AtelierError::validation(format!("unknown engine backend '{tag}'")))?;
        Ok(Self::new(kind))
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// Builds a fresh engine instance for one model.
    pub fn build(&self) -> Arc<dyn InferenceEngine> {
        match self.kind {
            EngineKind::Null => Arc::new(NullEngine),
            EngineKind::Mock => Arc::new(MockEngine::new()),
        }
    }
}

/// Backend used when none is configured. Every operation fails so that a
/// missing configuration surfaces at the first model operation instead of
/// producing silent garbage.
struct NullEngine;

impl NullEngine {
    fn unconfigured<T>() -> Result<T> {
        Err(AtelierError::engine(
            "no inference backend configured (set engine_backend in config.toml)",
        ))
    }
}

#[async_trait]
impl InferenceEngine for NullEngine {
    async fn load(
        &self,
        _model_path: &str,
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        Self::unconfigured()
    }

    async fn unload(&self) -> Result<()> {
        Self::unconfigured()
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatCompletion> {
        Self::unconfigured()
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatChunkStream> {
        Self::unconfigured()
    }
}
