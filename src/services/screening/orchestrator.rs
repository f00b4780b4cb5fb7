// Evaluation Orchestrator
// Runs the four metric evaluations concurrently with retry, cancellation and defaults

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{
    EntrySimilarity, MetricKind, MetricResult, MetricsBundle, SemanticSimilarity,
    SimilarityResult, Submission,
};
use crate::services::capability::{CapabilityError, MetricEvaluator};

use super::retry::{retry_with_backoff, OperationFailure, RetryPolicy};

fn failure_explanation(kind: MetricKind, failure: &OperationFailure) -> String {
    match failure {
        OperationFailure::Terminal(e) => format!("{} unavailable: {}", kind.label(), e),
        OperationFailure::Exhausted { attempts, last } => format!(
            "{} failed after {} attempts: {}",
            kind.label(),
            attempts,
            last
        ),
        OperationFailure::Cancelled => format!("{} evaluation cancelled", kind.label()),
    }
}

fn resolve(kind: MetricKind, outcome: Result<MetricResult, OperationFailure>) -> MetricResult {
    match outcome {
        Ok(result) => MetricResult::new(result.score, result.explanation),
        Err(failure) => {
            let explanation = failure_explanation(kind, &failure);
            warn!("[ORCHESTRATOR] {}; using default {}", explanation, kind.default_score());
            MetricResult::degraded(kind, explanation)
        }
    }
}

#[derive(Clone, Copy)]
enum PairMetric {
    Similarity,
    Paraphrase,
}

impl PairMetric {
    fn kind(self) -> MetricKind {
        match self {
            Self::Similarity => MetricKind::SemanticSimilarity,
            Self::Paraphrase => MetricKind::ParaphraseLikelihood,
        }
    }
}

pub struct EvaluationOrchestrator {
    evaluator: Arc<dyn MetricEvaluator>,
    policy: RetryPolicy,
}

impl EvaluationOrchestrator {
    pub fn new(evaluator: Arc<dyn MetricEvaluator>, policy: RetryPolicy) -> Self {
        Self { evaluator, policy }
    }

    pub async fn evaluate(
        &self,
        submission: &Submission,
        similar: &[SimilarityResult],
    ) -> MetricsBundle {
        self.evaluate_with_cancel(submission, similar, &CancellationToken::new())
            .await
    }

    /// Always returns a complete bundle. A metric that cannot be evaluated
    /// carries its default score and an explanation of the failure.
    pub async fn evaluate_with_cancel(
        &self,
        submission: &Submission,
        similar: &[SimilarityResult],
        cancel: &CancellationToken,
    ) -> MetricsBundle {
        let text = Arc::new(submission.full_text());
        info!(
            "[ORCHESTRATOR] Evaluating submission against {} similar talks",
            similar.len()
        );

        let (
            semantic_similarity,
            paraphrase_likelihood,
            ai_generation_probability,
            originality_score,
        ) = tokio::join!(
            self.semantic_similarity(&text, similar, cancel),
            self.paraphrase_likelihood(&text, similar, cancel),
            self.ai_generation(&text, cancel),
            self.originality(&text, similar, cancel),
        );

        info!(
            "[ORCHESTRATOR] Done: similarity={:.2} paraphrase={:.2} ai={:.2} originality={:.2}",
            semantic_similarity.max_score,
            paraphrase_likelihood.score,
            ai_generation_probability.score,
            originality_score.score
        );

        MetricsBundle {
            semantic_similarity,
            paraphrase_likelihood,
            ai_generation_probability,
            originality_score,
        }
    }

    /// One retried pairwise call per similar entry, run on a JoinSet.
    /// Results come back in the order of `similar`.
    async fn fan_out(
        &self,
        metric: PairMetric,
        text: &Arc<String>,
        similar: &[SimilarityResult],
        cancel: &CancellationToken,
    ) -> Vec<Result<MetricResult, OperationFailure>> {
        let mut set = JoinSet::new();
        for (idx, result) in similar.iter().enumerate() {
            let evaluator = Arc::clone(&self.evaluator);
            let text = Arc::clone(text);
            let other = result.entry.full_text();
            let cancel = cancel.clone();
            let policy = self.policy;

            set.spawn(async move {
                let evaluator = &evaluator;
                let (text, other) = (text.as_str(), other.as_str());
                let label = metric.kind().label();
                let outcome = retry_with_backoff(label, policy, &cancel, move |_| async move {
                    match metric {
                        PairMetric::Similarity => evaluator.similarity(text, other).await,
                        PairMetric::Paraphrase => evaluator.paraphrase(text, other).await,
                    }
                })
                .await;
                (idx, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<MetricResult, OperationFailure>>> =
            (0..similar.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => warn!("[ORCHESTRATOR] {} task failed: {}", metric.kind().label(), e),
            }
        }

        outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| {
                    Err(OperationFailure::Terminal(CapabilityError::EvaluationFailed(
                        "evaluation task aborted".to_string(),
                    )))
                })
            })
            .collect()
    }

    async fn semantic_similarity(
        &self,
        text: &Arc<String>,
        similar: &[SimilarityResult],
        cancel: &CancellationToken,
    ) -> SemanticSimilarity {
        if similar.is_empty() {
            return SemanticSimilarity {
                entries: Vec::new(),
                max_score: 0.0,
                explanation: "No similar historical talks to compare against".to_string(),
            };
        }

        let outcomes = self
            .fan_out(PairMetric::Similarity, text, similar, cancel)
            .await;

        let entries: Vec<EntrySimilarity> = similar
            .iter()
            .zip(outcomes)
            .map(|(r, outcome)| EntrySimilarity {
                entry_id: r.entry.id.clone(),
                title: r.entry.title.clone(),
                result: resolve(MetricKind::SemanticSimilarity, outcome),
            })
            .collect();

        let max_score = entries
            .iter()
            .map(|e| e.result.score)
            .fold(0.0f64, f64::max);
        let failed = entries.iter().filter(|e| e.result.degraded).count();
        let explanation = if failed == 0 {
            format!("Compared against {} similar talks", entries.len())
        } else {
            format!(
                "Compared against {} similar talks ({} evaluations failed)",
                entries.len(),
                failed
            )
        };

        SemanticSimilarity {
            entries,
            max_score,
            explanation,
        }
    }

    async fn paraphrase_likelihood(
        &self,
        text: &Arc<String>,
        similar: &[SimilarityResult],
        cancel: &CancellationToken,
    ) -> MetricResult {
        if similar.is_empty() {
            return MetricResult::new(0.0, "No similar historical talks to compare against");
        }

        let outcomes = self
            .fan_out(PairMetric::Paraphrase, text, similar, cancel)
            .await;

        // Failed entries contribute the default score
        let kind = MetricKind::ParaphraseLikelihood;
        let results: Vec<MetricResult> = outcomes.into_iter().map(|o| resolve(kind, o)).collect();
        let failed = results.iter().filter(|r| r.degraded).count();

        let Some(lead) = results.iter().find(|r| !r.degraded) else {
            return results
                .into_iter()
                .next()
                .unwrap_or_else(|| MetricResult::degraded(kind, "no paraphrase results"));
        };

        let mean = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;
        let mut explanation = format!(
            "Average paraphrase likelihood across {} similar talks: {}",
            results.len(),
            lead.explanation
        );
        if failed > 0 {
            explanation.push_str(&format!(" ({} evaluations failed)", failed));
        }
        MetricResult::new(mean, explanation)
    }

    async fn ai_generation(&self, text: &Arc<String>, cancel: &CancellationToken) -> MetricResult {
        let evaluator = &self.evaluator;
        let text = text.as_str();
        let label = MetricKind::AiGeneration.label();
        let outcome = retry_with_backoff(label, self.policy, cancel, move |_| async move {
            evaluator.ai_generation(text).await
        })
        .await;
        resolve(MetricKind::AiGeneration, outcome)
    }

    async fn originality(
        &self,
        text: &Arc<String>,
        similar: &[SimilarityResult],
        cancel: &CancellationToken,
    ) -> MetricResult {
        let references: Vec<String> = similar.iter().map(|r| r.entry.full_text()).collect();
        let evaluator = &self.evaluator;
        let text = text.as_str();
        let references = references.as_slice();
        let label = MetricKind::Originality.label();
        let outcome = retry_with_backoff(label, self.policy, cancel, move |_| async move {
            evaluator.originality(text, references).await
        })
        .await;
        resolve(MetricKind::Originality, outcome)
    }
}
