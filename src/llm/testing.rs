//! In-process doubles for the LLM client traits.

use async_trait::async_trait;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Mutex;

use super::chat::{ ChatClient, FragmentStream, GenerationStats, StreamEvent };
use super::embedding::{ EmbeddingClient, EmbeddingResponse };
use crate::error::ChatError;

pub enum Script {
    Reply(Vec<&'static str>),
    /// Emits the fragments, then fails instead of finishing.
    BreakAfter(Vec<&'static str>),
    Refuse,
}

pub struct ScriptedChatClient {
    script: Script,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedChatClient {
    pub fn new(script: Script) -> Self {
        Self { script, prompts: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let events: Vec<Result<StreamEvent, ChatError>> = match &self.script {
            Script::Reply(parts) => parts
                .iter()
                .map(|p| Ok(StreamEvent::Fragment(p.to_string())))
                .chain(std::iter::once(Ok(StreamEvent::Done(GenerationStats::default()))))
                .collect(),
            Script::BreakAfter(parts) => parts
                .iter()
                .map(|p| Ok(StreamEvent::Fragment(p.to_string())))
                .chain(std::iter::once(Err(ChatError::Incomplete)))
                .collect(),
            Script::Refuse => {
                return Err(ChatError::Status { status: 500, body: "model not loaded".into() });
            }
        };
        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn get_model(&self) -> String {
        "scripted".into()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}

/// Embeds text as presence flags of a fixed keyword list plus a small bias.
pub struct KeywordEmbeddingClient {
    keywords: Vec<&'static str>,
}

impl KeywordEmbeddingClient {
    pub fn new(keywords: Vec<&'static str>) -> Self {
        Self { keywords }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = self.keywords
            .iter()
            .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
            .collect();
        v.push(0.05);
        v
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, ChatError> {
        Ok(EmbeddingResponse { embedding: self.vector(text) })
    }
}
