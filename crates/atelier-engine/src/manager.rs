//! Inference engine lifecycle manager.
//!
//! Maps each model id to at most one live backend instance and one status
//! record. A per-model keyed lock guarantees that exactly one load-or-unload
//! operation is in flight per model id; unrelated models proceed in
//! parallel. Status flips are visible to concurrent readers through the
//! registry map, which is only locked briefly and never across an engine
//! call's await.

use crate::backend::EngineRegistry;
use atelier_core::engine::{
    ChatChunkStream, ChatCompletion, ChatMessage, InferenceEngine, ModelRecord, ModelStatus,
};
use atelier_core::error::{AtelierError, Result};
use atelier_core::sync::KeyedLocks;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Request to load a model.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub model_id: String,
    /// Backend-specific model path or reference.
    pub model_path: String,
    pub params: HashMap<String, serde_json::Value>,
}

struct ModelEntry {
    record: ModelRecord,
    engine: Option<Arc<dyn InferenceEngine>>,
}

/// Process-wide manager of loaded models.
pub struct ModelManager {
    registry: EngineRegistry,
    entries: Mutex<HashMap<String, ModelEntry>>,
    locks: KeyedLocks,
}

impl ModelManager {
    pub fn new(registry: EngineRegistry) -> Self {
        Self {
            registry,
            entries: Mutex::new(HashMap::new()),
            locks: KeyedLocks::new(),
        }
    }

    async fn set_status(&self, model_id: &str, status: ModelStatus, error: Option<String>) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(model_id.to_string()).or_insert_with(|| ModelEntry {
            record: ModelRecord::new(model_id),
            engine: None,
        });
        entry.record.status = status;
        entry.record.error = error;
    }

    /// Loads a model, serialized per model id.
    ///
    /// Loading an already-loaded model is a no-op returning the existing
    /// record. A failed load leaves the model in `Error` status; the failure
    /// is returned with context.
    pub async fn load(&self, request: LoadRequest) -> Result<ModelRecord> {
        if request.model_id.is_empty() {
            return Err(AtelierError::validation("model_id must not be empty"));
        }

        let _guard = self.locks.acquire(&request.model_id).await;

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&request.model_id) {
                if entry.record.status == ModelStatus::Loaded {
                    return Ok(entry.record.clone());
                }
            }
        }

        self.set_status(&request.model_id, ModelStatus::Loading, None)
            .await;

        let engine = self.registry.build();
        if let Err(e) = engine.load(&request.model_path, &request.params).await {
            self.set_status(&request.model_id, ModelStatus::Error, Some(e.to_string()))
                .await;
            return Err(AtelierError::engine(format!(
                "failed to load model '{}': {}",
                request.model_id, e
            )));
        }

        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(request.model_id.clone())
            .or_insert_with(|| ModelEntry {
                record: ModelRecord::new(&request.model_id),
                engine: None,
            });
        entry.record.status = ModelStatus::Loaded;
        entry.record.error = None;
        entry.record.loaded_at = Some(Utc::now().to_rfc3339());
        entry.engine = Some(engine);

        Ok(entry.record.clone())
    }

    /// Unloads a model, serialized per model id.
    ///
    /// Returns `Ok(false)` for an unknown model id. On success the model is
    /// removed from the registry entirely; a failed engine unload leaves the
    /// record in `Error` status.
    pub async fn unload(&self, model_id: &str) -> Result<bool> {
        let _guard = self.locks.acquire(model_id).await;

        let engine = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.get_mut(model_id) else {
                return Ok(false);
            };
            entry.record.status = ModelStatus::Unloading;
            entry.engine.take()
        };

        if let Some(engine) = engine {
            if let Err(e) = engine.unload().await {
                self.set_status(model_id, ModelStatus::Error, Some(e.to_string()))
                    .await;
                return Err(AtelierError::engine(format!(
                    "failed to unload model '{model_id}': {e}"
                )));
            }
        }

        self.entries.lock().await.remove(model_id);
        Ok(true)
    }

    /// Unloads every registered model, for shutdown draining. Failures are
    /// logged and skipped; the count of successfully unloaded models is
    /// returned.
    pub async fn unload_all(&self) -> usize {
        let model_ids: Vec<String> = self.entries.lock().await.keys().cloned().collect();

        let mut unloaded = 0;
        for model_id in model_ids {
            match self.unload(&model_id).await {
                Ok(true) => unloaded += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("failed to unload model '{}' during drain: {}", model_id, e);
                }
            }
        }
        unloaded
    }

    /// Returns the status record for a model, if registered.
    pub async fn status(&self, model_id: &str) -> Option<ModelRecord> {
        self.entries
            .lock()
            .await
            .get(model_id)
            .map(|entry| entry.record.clone())
    }

    /// Returns all status records, sorted by model id.
    pub async fn list_records(&self) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self
            .entries
            .lock()
            .await
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        records
    }

    async fn loaded_engine(&self, model_id: &str) -> Result<Arc<dyn InferenceEngine>> {
        let entries = self.entries.lock().await;
        entries
            .get(model_id)
            .filter(|entry| entry.record.status == ModelStatus::Loaded)
            .and_then(|entry| entry.engine.clone())
            .ok_or_else(|| AtelierError::not_found("model", model_id))
    }

    /// Runs a chat completion against a loaded model.
    pub async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatCompletion> {
        let engine = self.loaded_engine(model_id).await?;
        engine.chat(messages, params).await.map_err(|e| {
            AtelierError::engine(format!("chat failed for model '{model_id}': {e}"))
        })
    }

    /// Runs a streamed chat completion against a loaded model.
    pub async fn chat_stream(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
        params: &HashMap<String, serde_json::Value>,
    ) -> Result<ChatChunkStream> {
        let engine = self.loaded_engine(model_id).await?;
        engine.chat_stream(messages, params).await.map_err(|e| {
            AtelierError::engine(format!("chat stream failed for model '{model_id}': {e}"))
        })
    }
}
