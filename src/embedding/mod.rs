//! Sentence embeddings and topic-relevance ranking over document text.
//!
//! Not used by the review endpoint, which sends truncated raw text instead.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

pub mod candle;

pub use self::candle::MiniLmEmbedder;

pub const DEFAULT_MAX_CHUNKS: usize = 10;
const MIN_SENTENCE_CHARS: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("model loading failed: {0}")]
    ModelLoadFailed(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("embedder returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Zero for mismatched dimensions or a zero-length vector.
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let dot_product: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum();

        let magnitude_a: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = other.values.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 0.0;
        }

        dot_product / (magnitude_a * magnitude_b)
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;
}

/// A sentence-sized slice of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub source_index: usize,
}

/// Split every document on `". "` and keep fragments longer than 50 characters,
/// each terminated with a period.
pub fn sentence_chunks<S: AsRef<str>>(documents: &[S]) -> Vec<TextChunk> {
    documents
        .iter()
        .enumerate()
        .flat_map(|(source_index, document)| {
            document
                .as_ref()
                .split(". ")
                .map(str::trim)
                .filter(|sentence| sentence.chars().count() > MIN_SENTENCE_CHARS)
                .map(move |sentence| TextChunk {
                    text: format!("{sentence}."),
                    source_index,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Ranks text chunks by cosine similarity to a query using a shared embedder.
#[derive(Clone)]
pub struct SimilarityRanker {
    embedder: Arc<dyn Embedder>,
}

impl SimilarityRanker {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Top `k` chunks by descending similarity; equal scores keep input order.
    pub async fn find_similar_chunks(
        &self,
        query: &str,
        chunks: &[TextChunk],
        k: usize,
    ) -> Result<Vec<TextChunk>, EmbeddingError> {
        if chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let chunk_embeddings = self.embedder.embed_batch(&texts).await?;
        if chunk_embeddings.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                actual: chunk_embeddings.len(),
            });
        }
        let query_embedding = self.embedder.embed(query).await?;

        let mut scored: Vec<(usize, f32)> = chunk_embeddings
            .iter()
            .map(|embedding| query_embedding.cosine_similarity(embedding))
            .enumerate()
            .collect();
        // `sort_by` is stable, so ties stay in original order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        debug!(chunks = chunks.len(), k, "ranked chunks by similarity");

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, _)| chunks[idx].clone())
            .collect())
    }

    /// Join the `max_chunks` sentences most relevant to `topic` with blank lines.
    pub async fn get_relevant_context<S: AsRef<str>>(
        &self,
        topic: &str,
        documents: &[S],
        max_chunks: usize,
    ) -> Result<String, EmbeddingError> {
        let chunks = sentence_chunks(documents);
        let relevant = self.find_similar_chunks(topic, &chunks, max_chunks).await?;

        Ok(relevant
            .into_iter()
            .map(|chunk| chunk.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
