pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod session;

use agent::ChatAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("WebSocket Address: {}", args.server_addr);
    info!("HTTP Port: {}", args.http_port);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("default"));
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("default"));
    info!("Embedding Model: {}", args.embedding_model.as_deref().unwrap_or("default"));
    info!("Chunking: size={}, overlap={}", args.chunk_size, args.chunk_overlap);
    info!("Retrieval: top_k={}, score_threshold={}", args.rag_top_k, args.rag_score_threshold);
    info!("PDF Extractor: {}", args.pdftotext_path);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("History Turns: {}", args.history_turns);
    info!("API Key Required: {}", args.server_api_key.as_deref().map_or(false, |k| !k.is_empty()));
    info!("-------------------------");

    let agent = Arc::new(ChatAgent::from_args(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
