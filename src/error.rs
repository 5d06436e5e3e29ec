use thiserror::Error;

use crate::config::prompt::PromptError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("generation stream ended before the final record")]
    Incomplete,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("document error: {0}")]
    Document(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
