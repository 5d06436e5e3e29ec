use futures::StreamExt;
use log::{ info, error };
use std::error::Error;
use std::sync::Arc;

use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::error::ChatError;
use crate::llm::{ LlmConfig, LlmType };
use crate::llm::chat::{ ChatClient, FragmentStream, GenerationStats, StreamEvent, new_client as new_chat_client };
use crate::llm::embedding::new_client as new_embedding_client;
use crate::models::chat::{ format_history_for_prompt, ChatMessage, ChatMode, PendingTurn, SessionLog };
use crate::rag::loader::PdfLoader;
use crate::rag::splitter::TextSplitter;
use crate::rag::{ DocumentIndex, IngestSummary, RagEngine, RetrievalSettings };
use crate::session::ChatSession;

/// A running chat turn: the user entry is already in the log, the assistant
/// entry is appended by `commit` once the stream has finished.
pub struct Turn<'s> {
    pending: PendingTurn<'s>,
    stream: FragmentStream,
    stats: Option<GenerationStats>,
}

impl<'s> Turn<'s> {
    /// Next fragment of the reply, or `None` once the final record arrived.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, ChatError> {
        if self.stats.is_some() {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(Ok(StreamEvent::Fragment(text))) => {
                self.pending.push_fragment(&text);
                Ok(Some(text))
            }
            Some(Ok(StreamEvent::Done(stats))) => {
                self.stats = Some(stats);
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => Err(ChatError::Incomplete),
        }
    }

    pub fn stats(&self) -> Option<&GenerationStats> {
        self.stats.as_ref()
    }

    pub fn commit(self) -> ChatMessage {
        self.pending.commit()
    }

    pub async fn collect(mut self) -> Result<ChatMessage, ChatError> {
        while self.next_fragment().await?.is_some() {}
        Ok(self.commit())
    }
}

#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    rag: Arc<RagEngine>,
    prompt_config: Arc<PromptConfig>,
    history_turns: usize,
}

impl ChatAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        rag: Arc<RagEngine>,
        prompt_config: Arc<PromptConfig>,
        history_turns: usize
    ) -> Self {
        Self {
            chat_client,
            rag,
            prompt_config,
            history_turns,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            completion_model: args.chat_model.clone(),
            embedding_model: None,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}",
            chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("none")
        );

        let embedding_config = LlmConfig {
            llm_type: LlmType::Ollama,
            base_url: args.embedding_base_url.clone().or_else(|| args.chat_base_url.clone()),
            completion_model: None,
            embedding_model: args.embedding_model.clone(),
        };
        let embedding_client = new_embedding_client(&embedding_config)?;
        info!(
            "Embedding client configured: Model={:?}, BaseURL={:?}",
            embedding_config.embedding_model.as_deref().unwrap_or("adapter default"),
            embedding_config.base_url.as_deref().unwrap_or("adapter default")
        );

        let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;
        let splitter = TextSplitter::new(args.chunk_size, args.chunk_overlap)?;
        let settings = RetrievalSettings {
            top_k: args.rag_top_k,
            score_threshold: args.rag_score_threshold,
        };
        let rag = RagEngine::new(
            Arc::new(PdfLoader::new(args.pdftotext_path.clone())),
            splitter,
            embedding_client,
            Arc::clone(&prompt_config),
            settings
        );

        Ok(Self::new(chat_client, Arc::new(rag), prompt_config, args.history_turns))
    }

    /// Document mode when asked for, or when the session holds a document.
    fn route(&self, session: &ChatSession, mode: Option<ChatMode>) -> ChatMode {
        match mode {
            Some(mode) => mode,
            None if session.document.is_some() => ChatMode::Document,
            None => ChatMode::Generate,
        }
    }

    fn build_prompt(&self, log: &SessionLog, message: &str) -> Result<String, ChatError> {
        if self.history_turns == 0 || log.is_empty() {
            return Ok(message.to_string());
        }
        // One turn is a user message plus the assistant reply.
        let history = format_history_for_prompt(log.recent(self.history_turns * 2));
        Ok(prompt::get_history_prompt(&self.prompt_config, &history, message)?)
    }

    /// Records the user message and starts the reply. On error the log keeps
    /// the user entry only.
    pub async fn start_turn<'s>(
        &self,
        session: &'s mut ChatSession,
        message: &str,
        mode: Option<ChatMode>
    ) -> Result<Turn<'s>, ChatError> {
        let mode = self.route(session, mode);
        let generate_prompt = match mode {
            ChatMode::Generate => Some(self.build_prompt(&session.log, message)?),
            ChatMode::Document => None,
        };

        let ChatSession { id, log, document } = session;
        info!("Session {}: {:?} turn, {} byte(s)", id, mode, message.len());
        let pending = log.begin_turn(message);

        let started = match generate_prompt {
            Some(full_prompt) => self.chat_client.complete_stream(&full_prompt).await,
            None => self.rag.ask_stream(document.as_ref(), message, self.chat_client.as_ref()).await,
        };

        match started {
            Ok(stream) => Ok(Turn { pending, stream, stats: None }),
            Err(e) => {
                error!("Session {}: generation failed to start: {}", id, e);
                Err(e)
            }
        }
    }

    /// Runs a whole turn and returns the assistant message.
    pub async fn respond(
        &self,
        session: &mut ChatSession,
        message: &str,
        mode: Option<ChatMode>
    ) -> Result<ChatMessage, ChatError> {
        self.start_turn(session, message, mode).await?.collect().await
    }

    /// Builds a document index from uploaded bytes. Needs no session, so it
    /// can run while the session serves other turns.
    pub async fn ingest_upload(&self, bytes: &[u8], file_name: &str) -> Result<DocumentIndex, ChatError> {
        self.rag.ingest_upload(bytes, file_name).await
    }

    /// Replaces the session's document with `index`.
    pub fn install_document(&self, session: &mut ChatSession, index: DocumentIndex) -> IngestSummary {
        let summary = index.summary();
        info!("Session {}: document '{}' attached", session.id, summary.source);
        session.document = Some(index);
        summary
    }

    pub fn clear_document(&self, session: &mut ChatSession) -> bool {
        session.document.take().is_some()
    }
}
