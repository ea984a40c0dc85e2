use async_trait::async_trait;

use crate::core::errors::{PipelineError, PipelineResult};

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// provider name as configured (e.g. "local", "lite", "openai", "gemini")
    fn name(&self) -> &str;

    /// length of every vector this backend produces; fixed after construction
    fn dimension(&self) -> usize;

    /// embed description variants for indexing (document role)
    async fn encode_batch(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>>;

    /// embed a user description for searching (query role)
    async fn encode_query(&self, text: &str) -> PipelineResult<Vec<f32>>;
}

/// Reject provider output whose shape disagrees with the request.
pub(crate) fn check_vectors(
    provider: &str,
    expected_count: usize,
    dimension: usize,
    vectors: &[Vec<f32>],
) -> PipelineResult<()> {
    if vectors.len() != expected_count {
        return Err(PipelineError::Configuration(format!(
            "{} returned {} embeddings for {} inputs",
            provider,
            vectors.len(),
            expected_count
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(PipelineError::dimension_mismatch(provider, dimension, bad.len()));
    }
    Ok(())
}
