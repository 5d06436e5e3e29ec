pub mod loader;
pub mod splitter;
pub mod store;
pub mod upload;

use log::{ info, warn };
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::prompt::{ self, PromptConfig };
use crate::error::ChatError;
use crate::llm::chat::{ fixed_reply_stream, ChatClient, FragmentStream };
use crate::llm::embedding::EmbeddingClient;
use self::loader::DocumentLoader;
use self::splitter::TextSplitter;
use self::store::{ ScoredChunk, VectorStore };

pub const NO_DOCUMENT_REPLY: &str = "Please, add a PDF document first.";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub score_threshold: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: DEFAULT_TOP_K, score_threshold: DEFAULT_SCORE_THRESHOLD }
    }
}

/// Searchable form of one ingested document.
#[derive(Debug)]
pub struct DocumentIndex {
    source: String,
    pages: usize,
    store: VectorStore,
}

impl DocumentIndex {
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            source: self.source.clone(),
            pages: self.pages,
            chunks: self.store.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub source: String,
    pub pages: usize,
    pub chunks: usize,
}

/// Loads, splits and embeds documents, and answers questions from them.
/// Holds no per-session state; each session keeps its own `DocumentIndex`.
pub struct RagEngine {
    loader: Arc<dyn DocumentLoader>,
    splitter: TextSplitter,
    embedding_client: Arc<dyn EmbeddingClient>,
    prompt_config: Arc<PromptConfig>,
    settings: RetrievalSettings,
}

impl RagEngine {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        splitter: TextSplitter,
        embedding_client: Arc<dyn EmbeddingClient>,
        prompt_config: Arc<PromptConfig>,
        settings: RetrievalSettings
    ) -> Self {
        Self {
            loader,
            splitter,
            embedding_client,
            prompt_config,
            settings,
        }
    }

    pub async fn ingest(&self, path: &Path, source: &str) -> Result<DocumentIndex, ChatError> {
        let pages = self.loader.load(path).await?;
        let chunks = self.splitter.split_pages(&pages, source);
        if chunks.is_empty() {
            return Err(ChatError::Document(format!("no extractable text in {}", source)));
        }

        let texts: Vec<String> = chunks
            .iter()
            .map(|c| c.text.clone())
            .collect();
        let embeddings = self.embedding_client.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(
                ChatError::Embedding(
                    format!("{} chunks but {} embeddings", chunks.len(), embeddings.len())
                )
            );
        }

        let mut store = VectorStore::new();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            store.add(chunk, embedding);
        }

        let index = DocumentIndex { source: source.to_string(), pages: pages.len(), store };
        info!("Ingested '{}': {} page(s), {} chunk(s)", source, index.pages, index.store.len());
        Ok(index)
    }

    /// Ingests uploaded bytes through a scoped temp file, released on every
    /// exit path.
    pub async fn ingest_upload(&self, bytes: &[u8], source: &str) -> Result<DocumentIndex, ChatError> {
        let file = upload::write_temp_upload(bytes)?;
        let result = self.ingest(file.path(), source).await;
        if let Err(e) = file.close() {
            warn!("Failed to remove temporary upload for '{}': {}", source, e);
        }
        result
    }

    pub async fn retrieve(
        &self,
        index: &DocumentIndex,
        question: &str
    ) -> Result<Vec<ScoredChunk>, ChatError> {
        let embed_resp = self.embedding_client.embed(question).await?;
        let hits = index.store.search(
            &embed_resp.embedding,
            self.settings.top_k,
            self.settings.score_threshold
        );
        info!("Retrieved {} chunk(s) from '{}'", hits.len(), index.source);
        Ok(hits)
    }

    /// Answers `question` from `index`, or with `NO_DOCUMENT_REPLY` without
    /// calling the model when there is no document.
    pub async fn ask_stream(
        &self,
        index: Option<&DocumentIndex>,
        question: &str,
        chat_client: &dyn ChatClient
    ) -> Result<FragmentStream, ChatError> {
        let index = match index {
            Some(index) => index,
            None => {
                return Ok(fixed_reply_stream(NO_DOCUMENT_REPLY));
            }
        };

        let hits = self.retrieve(index, question).await?;
        let context = format_context(&hits);
        let rag_prompt = prompt::get_rag_answer_prompt(&self.prompt_config, question, &context)?;
        chat_client.complete_stream(&rag_prompt).await
    }
}

pub fn format_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
