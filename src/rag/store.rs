use serde::Serialize;

use super::splitter::Chunk;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub score: f32,
    pub text: String,
    pub source: String,
    pub page: usize,
}

/// Brute-force in-memory vector index over document chunks.
#[derive(Debug, Default)]
pub struct VectorStore {
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chunk: Chunk, embedding: Vec<f32>) {
        self.entries.push((chunk, embedding));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// At most `top_k` chunks scoring at least `score_threshold`, best first.
    pub fn search(&self, query: &[f32], top_k: usize, score_threshold: f32) -> Vec<ScoredChunk> {
        let mut hits: Vec<(f32, &Chunk)> = self.entries
            .iter()
            .map(|(chunk, embedding)| (cosine_similarity(query, embedding), chunk))
            .filter(|(score, _)| *score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        hits.truncate(top_k);

        hits.into_iter()
            .map(|(score, chunk)| ScoredChunk {
                score,
                text: chunk.text.clone(),
                source: chunk.source.clone(),
                page: chunk.page,
            })
            .collect()
    }
}

/// Zero when either vector has no magnitude or the dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
