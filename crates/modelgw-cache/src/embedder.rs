//! The embedding-service boundary.
//!
//! Embedding generation is an external collaborator; the cache only needs a
//! vector per normalized request text and a similarity measure over those
//! vectors.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the embedding collaborator.
///
/// All variants are non-fatal to the request pipeline; the cache maps them
/// to a miss.
#[derive(Debug, Clone, Error)]
pub enum EmbedderError {
    /// The embedding service could not be reached
    #[error("embedding service unavailable: {0}")]
    Unavailable(String),
    /// The service rejected the input
    #[error("embedding input rejected: {0}")]
    InvalidInput(String),
}

/// Produces a vector for a piece of text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text` into a vector.
    ///
    /// # Errors
    /// Returns an [`EmbedderError`] when the external service fails; callers
    /// must treat that as a cache miss, never as a request failure.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs, which can never
/// clear a positive similarity threshold.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
