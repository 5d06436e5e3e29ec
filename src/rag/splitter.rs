use std::collections::VecDeque;

use super::loader::PageDocument;
use crate::error::ChatError;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// A piece of a document small enough to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub page: usize,
}

/// Recursive character splitter.
///
/// Text is cut on the first separator it contains (paragraphs, then lines,
/// then words, then characters). Pieces still longer than `chunk_size` are
/// cut again with the finer separators, and neighbouring pieces are merged
/// back into chunks of at most `chunk_size` characters that repeat up to
/// `chunk_overlap` characters of the previous chunk. Each separator stays
/// attached to the start of the piece that follows it.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChatError> {
        if chunk_size == 0 {
            return Err(ChatError::Config("chunk size must be positive".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(
                ChatError::Config(
                    format!(
                        "chunk overlap ({}) must be smaller than chunk size ({})",
                        chunk_overlap,
                        chunk_size
                    )
                )
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: ["\n\n", "\n", " ", ""].iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    pub fn split_pages(&self, pages: &[PageDocument], source: &str) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.split_text(&page.text)
                    .into_iter()
                    .map(move |text| Chunk { text, source: source.to_string(), page: page.page })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_trimmed(&mut chunks, &current);
                while
                    total > self.chunk_overlap ||
                    (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => {
                            total -= dropped;
                        }
                        None => {
                            break;
                        }
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }
        push_trimmed(&mut chunks, &current);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, current: &VecDeque<(&str, usize)>) {
    let joined: String = current
        .iter()
        .map(|(piece, _)| *piece)
        .collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// `"a\n\nb"` split on `"\n\n"` gives `["a", "\n\nb"]`. An empty separator
/// splits into characters. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
