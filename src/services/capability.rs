// Capability Interfaces
// External collaborators consumed by the screening core: embeddings and metric evaluation

use async_trait::async_trait;
use thiserror::Error;

use crate::models::MetricResult;

/// Failure modes of an external capability call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Missing credential, disabled feature, or rejected authentication.
    /// Retrying cannot help.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The backend responded but with an error, a non-2xx status or a malformed payload
    #[error("evaluation failed: {0}")]
    EvaluationFailed(String),
}

impl CapabilityError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Text embedding backend.
///
/// Implementations return `CapabilityError::Unavailable` when no backend is
/// configured, which makes the similarity search fall back to lexical ranking.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>>;

    /// Model identifier, used in logs
    fn model_name(&self) -> &str;
}

/// Scoring backend providing four independent metrics.
///
/// Scores are expected in [0, 1]; callers clamp anyway.
#[async_trait]
pub trait MetricEvaluator: Send + Sync {
    /// Semantic similarity between a submission and one historical talk
    async fn similarity(&self, text_a: &str, text_b: &str) -> CapabilityResult<MetricResult>;

    /// Likelihood that `text_a` is a reworded version of `text_b`
    async fn paraphrase(&self, text_a: &str, text_b: &str) -> CapabilityResult<MetricResult>;

    /// Probability that the text was machine-generated
    async fn ai_generation(&self, text: &str) -> CapabilityResult<MetricResult>;

    /// Degree to which `text` is not derived from `reference_texts` (1.0 = fully original)
    async fn originality(
        &self,
        text: &str,
        reference_texts: &[String],
    ) -> CapabilityResult<MetricResult>;
}
