use log::warn;
use serde::Deserialize;

use super::{ GenerationStats, StreamEvent };

/// One record of a streamed `/api/generate` body.
#[derive(Debug, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub total_duration: Option<u64>,
}

/// Turns arbitrarily split body bytes into stream events.
///
/// Records are separated by `\n`. Bytes are buffered until a full line is
/// available, so a network chunk may end anywhere, including inside a UTF-8
/// sequence. The `done` record ends decoding and never contributes text.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buf.extend_from_slice(bytes);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            self.decode_line(&line[..line.len() - 1], &mut events);
            if self.done {
                self.buf.clear();
                break;
            }
        }
        events
    }

    /// Flushes a final record that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.done && !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            self.decode_line(&line, &mut events);
        }
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<GenerateChunk>(line) {
            Ok(chunk) => {
                if chunk.done {
                    self.done = true;
                    events.push(
                        StreamEvent::Done(GenerationStats {
                            eval_count: chunk.eval_count,
                            total_duration: chunk.total_duration,
                        })
                    );
                } else if !chunk.response.is_empty() {
                    events.push(StreamEvent::Fragment(chunk.response));
                }
            }
            Err(e) => {
                warn!("Skipping malformed generate record: {} for line: {}", e, line);
            }
        }
    }
}
