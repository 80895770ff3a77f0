//! In-memory embedding index over one document's chunks.
//!
//! The index is built wholesale from a chunk sequence and never mutated
//! afterwards. Replacing the document means building a new index; there
//! is no incremental insert, delete, or persistence.
//!
//! # Ranking
//!
//! Brute-force cosine similarity against every stored vector, sorted by
//! score descending with ties broken by ascending chunk index, then
//! truncated to `k`.

use std::cmp::Ordering;

use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::PipelineError;
use crate::models::Chunk;

/// A retrieved chunk and its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Chunk vectors for a single document.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    model: String,
    dims: usize,
    entries: Vec<Entry>,
}

impl EmbeddingIndex {
    /// Embed every chunk and build the index.
    ///
    /// Chunks are embedded in sequential batches of `batch_size`. Any
    /// embedding failure, a batch returning the wrong number of vectors,
    /// or vectors of inconsistent length aborts the build and no index is
    /// returned.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self, PipelineError> {
        if chunks.is_empty() {
            return Err(PipelineError::EmptyContent(
                "document produced no chunks to index".to_string(),
            ));
        }
        let batch_size = batch_size.max(1);

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(PipelineError::invalid_response(format!(
                    "embedding service returned {} vectors for {} inputs",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dims = match embedder.dims() {
            Some(d) => d,
            None => vectors.first().map(|v| v.len()).unwrap_or(0),
        };
        if dims == 0 {
            return Err(PipelineError::invalid_response(
                "embedding service returned empty vectors",
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(PipelineError::invalid_response(format!(
                "embedding dimension mismatch: expected {}, got {}",
                dims,
                bad.len()
            )));
        }

        let entries: Vec<Entry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();

        debug!(
            chunks = entries.len(),
            dims,
            model = embedder.model_name(),
            "built embedding index"
        );

        Ok(Self {
            model: embedder.model_name().to_string(),
            dims,
            entries,
        })
    }

    /// Embed `question` and return up to `k` most similar chunks.
    pub async fn query(
        &self,
        question: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredChunk<'_>>, PipelineError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut embedded = embedder.embed(&[question.to_string()]).await?;
        let vector = match embedded.pop() {
            Some(v) if embedded.is_empty() => v,
            _ => {
                return Err(PipelineError::invalid_response(
                    "embedding service did not return exactly one query vector",
                ))
            }
        };
        if vector.len() != self.dims {
            return Err(PipelineError::invalid_response(format!(
                "query vector has {} dimensions, index has {}",
                vector.len(),
                self.dims
            )));
        }
        Ok(self.query_vector(&vector, k))
    }

    /// Rank stored chunks against a precomputed query vector.
    pub fn query_vector(&self, query: &[f32], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: &e.chunk,
                score: cosine_similarity(query, &e.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.index.cmp(&b.chunk.index))
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}
