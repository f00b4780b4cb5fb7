// Screening Pipeline
// Submission -> similar talks -> metrics -> risk guidance

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::models::{AnalysisReport, CorpusEntry, Submission, SubmissionError};
use crate::services::capability::{EmbeddingProvider, MetricEvaluator};
use crate::services::config_store::AppConfig;
use crate::services::corpus_store::CorpusStore;
use crate::services::providers::{EvaluatorClient, HttpEmbeddingProvider, ProviderError};

use super::orchestrator::EvaluationOrchestrator;
use super::retry::RetryPolicy;
use super::risk::RiskAggregator;
use super::similarity_search::SimilaritySearch;

#[derive(Error, Debug)]
pub enum ScreeningError {
    #[error("invalid submission: {0}")]
    InvalidInput(#[from] SubmissionError),
}

pub struct ScreeningPipeline {
    search: SimilaritySearch,
    orchestrator: EvaluationOrchestrator,
    aggregator: RiskAggregator,
}

impl ScreeningPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        evaluator: Arc<dyn MetricEvaluator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            search: SimilaritySearch::new(embeddings),
            orchestrator: EvaluationOrchestrator::new(evaluator, policy),
            aggregator: RiskAggregator::new(),
        }
    }

    /// Build HTTP-backed capabilities from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let proxy = config.proxy.as_ref().and_then(|p| p.active_url());
        let embeddings = HttpEmbeddingProvider::from_config(&config.embedding, proxy)?;
        let evaluator = EvaluatorClient::from_config(&config.evaluator, proxy)?;
        Ok(Self::new(
            Arc::new(embeddings),
            Arc::new(evaluator),
            config.evaluator.retry_policy(),
        ))
    }

    pub async fn analyze(
        &self,
        submission: &Submission,
        corpus: &[Arc<CorpusEntry>],
    ) -> Result<AnalysisReport, ScreeningError> {
        self.analyze_with_cancel(submission, corpus, &CancellationToken::new())
            .await
    }

    pub async fn analyze_store(
        &self,
        submission: &Submission,
        store: &CorpusStore,
    ) -> Result<AnalysisReport, ScreeningError> {
        self.analyze(submission, &store.all_entries()).await
    }

    /// Invalid input is the only error; capability problems degrade the
    /// report instead of failing it.
    pub async fn analyze_with_cancel(
        &self,
        submission: &Submission,
        corpus: &[Arc<CorpusEntry>],
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, ScreeningError> {
        submission.validate()?;
        let start = Instant::now();
        info!(
            "[PIPELINE] Analyzing \"{}\" against {} corpus entries",
            submission.title(),
            corpus.len()
        );

        let similar_talks = self
            .search
            .find_similar_with_cancel(submission, corpus, cancel)
            .await;
        let metrics = self
            .orchestrator
            .evaluate_with_cancel(submission, &similar_talks, cancel)
            .await;
        let assessment = self.aggregator.aggregate(&metrics);

        info!(
            "[PIPELINE] Completed in {}ms: {} ({} concerns)",
            start.elapsed().as_millis(),
            assessment.risk_level,
            assessment.concerns.len()
        );

        Ok(AnalysisReport {
            similar_talks,
            metrics,
            risk_level: assessment.risk_level,
            recommendation: assessment.recommendation,
            concerns: assessment.concerns,
        })
    }

    /// Release held resources (embedding cache)
    pub async fn shutdown(&self) {
        self.search.release().await;
        info!("[PIPELINE] Shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskLevel, SearchStrategy};
    use crate::services::capability::CapabilityError;
    use crate::services::screening::test_support::{Script, ScriptedEvaluator, StubEmbeddings};
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            backoff_unit: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn submission() -> Submission {
        Submission::new(
            "Building a tiny async runtime",
            "We build an async runtime from scratch in Rust: executors, wakers and timers explained.",
            Some("Live coding session".to_string()),
        )
        .unwrap()
    }

    fn store() -> CorpusStore {
        let mut store = CorpusStore::new();
        store.add_entries(vec![
            CorpusEntry::new("Building an async runtime in Rust", "sched")
                .with_abstract("Executors, wakers and timers: writing an async runtime from scratch in Rust.")
                .with_url("https://sched.example/1"),
            CorpusEntry::new("Kubernetes operators in Go", "sessionize")
                .with_abstract("Reconciliation loops and CRDs for platform teams.")
                .with_url("https://sessionize.example/2"),
        ]);
        store
    }

    fn unavailable_embeddings() -> Arc<StubEmbeddings> {
        Arc::new(StubEmbeddings::failing(CapabilityError::Unavailable(
            "embeddings disabled".into(),
        )))
    }

    #[tokio::test]
    async fn test_high_similarity_requires_attention() {
        let evaluator = Arc::new(ScriptedEvaluator::fixed(0.85, 0.3, 0.1, 0.7));
        let pipeline = ScreeningPipeline::new(unavailable_embeddings(), evaluator, policy());

        let report = pipeline.analyze_store(&submission(), &store()).await.unwrap();
        assert!(!report.similar_talks.is_empty());
        assert!(report.similar_talks.len() <= 5);
        assert_eq!(report.similar_talks[0].strategy, SearchStrategy::Lexical);
        assert_eq!(report.similar_talks[0].entry.title, "Building an async runtime in Rust");
        assert_eq!(report.risk_level, RiskLevel::AttentionRequired);
        assert!(report.concerns[0].starts_with("HIGH semantic similarity"));
    }

    #[tokio::test]
    async fn test_clean_submission_standard_review() {
        let evaluator = Arc::new(ScriptedEvaluator::fixed(0.2, 0.1, 0.1, 0.8));
        let pipeline = ScreeningPipeline::new(unavailable_embeddings(), evaluator, policy());

        let report = pipeline.analyze_store(&submission(), &store()).await.unwrap();
        assert_eq!(report.risk_level, RiskLevel::StandardReview);
        assert!(report.concerns.is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus_still_reports() {
        let embeddings = Arc::new(StubEmbeddings::new(|_| vec![1.0, 0.0]));
        let evaluator = Arc::new(ScriptedEvaluator::fixed(0.9, 0.9, 0.2, 0.9));
        let pipeline = ScreeningPipeline::new(embeddings.clone(), evaluator.clone(), policy());

        let report = pipeline.analyze(&submission(), &[]).await.unwrap();
        assert!(report.similar_talks.is_empty());
        assert_eq!(embeddings.call_count(), 0);
        assert_eq!(evaluator.similarity_calls(), 0);
        assert_eq!(report.metrics.semantic_similarity.max_score, 0.0);
        assert_eq!(report.risk_level, RiskLevel::StandardReview);
    }

    #[tokio::test]
    async fn test_evaluator_down_yields_defaults() {
        let down = || Script::AlwaysFail(CapabilityError::Unavailable("evaluator disabled".into()));
        let evaluator = Arc::new(ScriptedEvaluator::new(down(), down(), down(), down()));
        let pipeline = ScreeningPipeline::new(unavailable_embeddings(), evaluator, policy());

        let report = pipeline.analyze_store(&submission(), &store()).await.unwrap();
        assert_eq!(report.metrics.ai_generation_probability.score, 0.0);
        assert_eq!(report.metrics.originality_score.score, 0.5);
        // Neutral originality is a single moderate concern
        assert_eq!(report.risk_level, RiskLevel::StandardReview);
        assert_eq!(report.concerns.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_cache() {
        let embeddings = Arc::new(StubEmbeddings::new(|t| vec![t.len() as f32, 1.0]));
        let evaluator = Arc::new(ScriptedEvaluator::fixed(0.1, 0.1, 0.1, 0.9));
        let pipeline = ScreeningPipeline::new(embeddings, evaluator, policy());

        pipeline.analyze_store(&submission(), &store()).await.unwrap();
        assert_eq!(pipeline.search.cached_embeddings().await, 3);
        pipeline.shutdown().await;
        assert_eq!(pipeline.search.cached_embeddings().await, 0);
    }

    #[test]
    fn test_invalid_input_error_wraps_submission_error() {
        let err = ScreeningError::from(SubmissionError::TitleTooShort { min: 10, actual: 3 });
        assert!(err.to_string().contains("title must be at least 10"));
    }
}
