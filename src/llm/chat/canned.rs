use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::time::Duration;

use super::{ create_streaming_response, ChatClient, FragmentStream, GenerationStats, StreamEvent };
use crate::error::ChatError;

pub const CANNED_REPLIES: [&str; 3] = [
    "Hello there! How can I assist you today? :)",
    "Hi, human! Is there anything I can help you with?",
    "Do you need help?",
];

/// Streams a randomly picked greeting one word at a time.
#[derive(Debug, Clone)]
pub struct CannedClient {
    delay: Duration,
}

impl CannedClient {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for CannedClient {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl ChatClient for CannedClient {
    async fn complete_stream(&self, _prompt: &str) -> Result<FragmentStream, ChatError> {
        let reply = CANNED_REPLIES.choose(&mut rand::thread_rng()).copied().unwrap_or(CANNED_REPLIES[0]);
        let delay = self.delay;

        Ok(
            create_streaming_response(move |tx| async move {
                for word in reply.split_whitespace() {
                    tokio::time::sleep(delay).await;
                    if tx.send(Ok(StreamEvent::Fragment(format!("{} ", word)))).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(Ok(StreamEvent::Done(GenerationStats::default()))).await;
            })
        )
    }

    fn get_model(&self) -> String {
        "canned".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}
