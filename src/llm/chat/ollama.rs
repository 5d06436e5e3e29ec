use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client as HttpClient;
use serde::Serialize;

use super::ndjson::NdjsonDecoder;
use super::{ create_streaming_response, ChatClient, FragmentStream };
use crate::error::ChatError;
use crate::llm::{ LlmConfig, LlmType, DEFAULT_BASE_URL };

pub const DEFAULT_COMPLETION_MODEL: &str = "llama2:latest";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>, completion_model: Option<String>) -> Self {
        let model = completion_model.unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            http: HttpClient::new(),
            base_url: url.trim_end_matches('/').to_string(),
            completion_model: model,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        if config.llm_type != LlmType::Ollama {
            return Err(ChatError::Config("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }

    /// Issues the generate request and returns once the response headers
    /// arrive. Connection failures and non-2xx statuses surface here; the
    /// body is decoded lazily as the returned stream is polled.
    pub async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream, ChatError> {
        let url = format!("{}/api/generate", self.base_url);
        let req = GenerateRequest {
            model: &self.completion_model,
            prompt,
            stream: true,
        };
        debug!("POST {} model={} prompt_len={}", url, self.completion_model, prompt.len());

        let response = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|source| ChatError::Transport { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status: status.as_u16(), body });
        }

        let mut bytes = response.bytes_stream();
        Ok(
            create_streaming_response(move |tx| async move {
                let mut decoder = NdjsonDecoder::new();
                while let Some(chunk_result) = bytes.next().await {
                    match chunk_result {
                        Ok(chunk) => {
                            for event in decoder.push(&chunk) {
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                            if decoder.is_done() {
                                return;
                            }
                        }
                        Err(source) => {
                            let _ = tx.send(Err(ChatError::Transport { url, source })).await;
                            return;
                        }
                    }
                }

                for event in decoder.finish() {
                    if tx.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
                if !decoder.is_done() {
                    let _ = tx.send(Err(ChatError::Incomplete)).await;
                }
            })
        )
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream, ChatError> {
        self.generate_stream(prompt).await
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
