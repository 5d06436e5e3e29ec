use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ EmbeddingClient, EmbeddingResponse };
use crate::error::ChatError;
use crate::llm::{ LlmConfig, DEFAULT_BASE_URL };

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const EMBED_BATCH_SIZE: usize = 16;

pub struct OllamaEmbeddingClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let embed_model = model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            model: embed_model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.base_url.clone(), config.embedding_model.clone())
    }

    async fn embed_chunk(&self, input: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let url = format!("{}/api/embed", self.base_url);
        debug!("POST {} model={} inputs={}", url, self.model, input.len());

        let response = self.http
            .post(&url)
            .json(&(EmbedRequest { model: &self.model, input }))
            .send().await
            .map_err(|source| ChatError::Transport { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status: status.as_u16(), body });
        }

        let data = response
            .json::<EmbedResponse>().await
            .map_err(|source| ChatError::Transport { url: url.clone(), source })?;

        if data.embeddings.len() != input.len() {
            return Err(
                ChatError::Embedding(
                    format!(
                        "expected {} embeddings from {}, got {}",
                        input.len(),
                        url,
                        data.embeddings.len()
                    )
                )
            );
        }
        Ok(data.embeddings)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, ChatError> {
        let mut embeddings = self.embed_chunk(&[text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| ChatError::Embedding("Ollama embedding generation returned no results".into()))?;

        Ok(EmbeddingResponse { embedding })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_chunk(batch).await?);
        }
        Ok(vectors)
    }
}
