// Screening Module
// Similar-talk retrieval, concurrent metric evaluation and risk aggregation

pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod risk;
pub mod similarity_search;

#[cfg(test)]
pub(crate) mod test_support;

pub use orchestrator::EvaluationOrchestrator;
pub use pipeline::{ScreeningError, ScreeningPipeline};
pub use retry::{retry_with_backoff, OperationFailure, RetryPolicy};
pub use risk::RiskAggregator;
pub use similarity_search::{cosine_similarity, SimilaritySearch, MAX_SIMILAR_RESULTS};
