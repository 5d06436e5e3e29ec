pub mod canned;
pub mod ndjson;
pub mod ollama;

use async_trait::async_trait;
use futures::{ Future, Stream };
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType };
use self::canned::CannedClient;
use self::ollama::OllamaClient;
use crate::error::ChatError;

/// Counters reported by the final record of a generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub eval_count: Option<u64>,
    /// Nanoseconds.
    pub total_duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    Done(GenerationStats),
}

/// Finite fragment sequence ending with `StreamEvent::Done`. Consumed once.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ChatError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream, ChatError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<Result<StreamEvent, ChatError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// A stream that answers with `text` without contacting any server.
pub fn fixed_reply_stream(text: impl Into<String>) -> FragmentStream {
    let events = vec![
        Ok(StreamEvent::Fragment(text.into())),
        Ok(StreamEvent::Done(GenerationStats::default()))
    ];
    Box::pin(futures::stream::iter(events))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ChatError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Canned => Arc::new(CannedClient::default()),
    };
    Ok(client)
}
