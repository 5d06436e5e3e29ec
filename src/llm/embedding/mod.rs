pub mod ollama;

use async_trait::async_trait;
use std::sync::Arc;

use super::{ LlmConfig, LlmType };
use self::ollama::OllamaEmbeddingClient;
use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, ChatError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?.embedding);
        }
        Ok(vectors)
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn EmbeddingClient>, ChatError> {
    match config.llm_type {
        LlmType::Ollama => Ok(Arc::new(OllamaEmbeddingClient::from_config(config))),
        other =>
            Err(ChatError::Config(format!("LLM type '{}' does not provide embeddings", other))),
    }
}
