//! In-memory echo backend for tests and local development.

use crate::stream::{blocking_chunk_stream, text_chunks};
use async_trait::async_trait;
use atelier_core::engine::{
    ChatChunkStream, ChatCompletion, ChatMessage, InferenceEngine,
};
use atelier_core::error::{AtelierError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Echo engine: loads instantly and replies with the last user message.
///
/// `failing()` builds an instance whose `load` always errors, for exercising
/// the manager's error transitions.
pub struct MockEngine {
    loaded: AtomicBool,
    fail_load: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            fail_load: false,
        }
    }

    /// An engine whose `load` fails, to drive error-state tests.
    pub fn failing() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            fail_load: true,
        }
    }

    fn require_loaded(&self) -> Result<()> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(AtelierError::engine("mock engine has no model loaded"));
        }
        Ok(())
    }

    fn echo(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| format!("echo: {}", message.content))
            .unwrap_or_else(|| "echo:".to_string())
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn load(
        &self,
        model_path: &str,
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        if self.fail_load {
            return Err(AtelierError::engine(format!(
                "mock engine refused to load '{model_path}'"
            )));
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        self.loaded.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatCompletion> {
        self.require_loaded()?;
        Ok(ChatCompletion {
            content: Self::echo(messages),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        _params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatChunkStream> {
        self.require_loaded()?;
        Ok(blocking_chunk_stream(text_chunks(&Self::echo(messages)), 8))
    }
}
