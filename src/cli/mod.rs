use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (ollama, canned)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "ollama")]
    pub chat_llm_type: String,

    /// Base URL of the Ollama server (e.g., http://localhost:11434)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// Model name for generation (e.g., llama2:latest, mistral)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    // --- Embedding Args ---
    /// Base URL of the Ollama server used for embeddings. Defaults to CHAT_BASE_URL if not set.
    #[arg(long, env = "EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<String>,

    /// Model name for text embedding (e.g., nomic-embed-text)
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    // --- Document Args ---
    /// Maximum characters per document chunk.
    #[arg(long, env = "CHUNK_SIZE", default_value = "1024")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks.
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "100")]
    pub chunk_overlap: usize,

    /// Maximum number of chunks retrieved per question.
    #[arg(long, env = "RAG_TOP_K", default_value = "3")]
    pub rag_top_k: usize,

    /// Minimum cosine similarity for a chunk to be used as context (-1.0 to 1.0).
    #[arg(long, env = "RAG_SCORE_THRESHOLD", default_value = "0.5")]
    pub rag_score_threshold: f32,

    /// pdftotext executable used to extract text from uploaded PDFs.
    #[arg(long, env = "PDFTOTEXT_PATH", default_value = "pdftotext")]
    pub pdftotext_path: String,

    /// Largest accepted upload in bytes.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "20971520")]
    pub max_upload_bytes: usize,

    // --- General App Args ---
    /// Optional JSON file overriding the built-in prompt templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Number of previous turns (user message plus reply) sent along with each prompt. 0 sends the bare prompt.
    #[arg(long, env = "HISTORY_TURNS", default_value = "0")]
    pub history_turns: usize,

    /// Seconds a session may stay unused before it is discarded.
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: u64,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port of the HTTP server serving the chat page and JSON API.
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    pub http_port: u16,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,
}
