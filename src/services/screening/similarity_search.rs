// Similarity Search
// Ranks corpus entries against a submission: embeddings first, lexical overlap as fallback

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{CorpusEntry, SearchStrategy, SimilarityResult, Submission};
use crate::services::capability::{CapabilityError, CapabilityResult, EmbeddingProvider};
use crate::services::text_processor::{jaccard, leading_word_set, word_set};

pub const MAX_SIMILAR_RESULTS: usize = 5;
/// Lexical matches at or below this combined score are dropped
pub const LEXICAL_MIN_SCORE: f64 = 0.10;
const EMBEDDING_PARAPHRASE_FACTOR: f64 = 0.8;
const LEXICAL_PARAPHRASE_FACTOR: f64 = 1.2;
const LEXICAL_FULL_WEIGHT: f64 = 0.6;
const LEXICAL_TITLE_WEIGHT: f64 = 0.4;
const TITLE_PROXY_TOKENS: usize = 10;

/// Cosine similarity clamped to [0, 1].
/// Mismatched lengths or a zero-magnitude vector give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    crate::models::clamp_unit(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn rank(mut results: Vec<SimilarityResult>) -> Vec<SimilarityResult> {
    // sort_by is stable: ties keep corpus order
    results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    results.truncate(MAX_SIMILAR_RESULTS);
    results
}

pub struct SimilaritySearch {
    embeddings: Arc<dyn EmbeddingProvider>,
    cache: RwLock<HashMap<String, Arc<Vec<f32>>>>,
}

impl SimilaritySearch {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn find_similar(
        &self,
        submission: &Submission,
        entries: &[Arc<CorpusEntry>],
    ) -> Vec<SimilarityResult> {
        self.find_similar_with_cancel(submission, entries, &CancellationToken::new())
            .await
    }

    /// Top matches, most similar first. Never fails: any embedding problem,
    /// including cancellation, drops to the lexical ranking.
    pub async fn find_similar_with_cancel(
        &self,
        submission: &Submission,
        entries: &[Arc<CorpusEntry>],
        cancel: &CancellationToken,
    ) -> Vec<SimilarityResult> {
        if entries.is_empty() {
            debug!("[SIMILARITY] Empty corpus, nothing to rank");
            return Vec::new();
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(CapabilityError::EvaluationFailed("cancelled".to_string()))
            }
            res = self.embedding_ranking(submission, entries) => res,
        };

        match outcome {
            Ok(results) => {
                info!(
                    "[SIMILARITY] Embedding ranking ({}) over {} entries -> {} results",
                    self.embeddings.model_name(),
                    entries.len(),
                    results.len()
                );
                results
            }
            Err(e) => {
                warn!("[SIMILARITY] Embedding search failed ({}), using lexical fallback", e);
                let results = Self::lexical_ranking(submission, entries);
                info!(
                    "[SIMILARITY] Lexical ranking over {} entries -> {} results",
                    entries.len(),
                    results.len()
                );
                results
            }
        }
    }

    async fn embedding_ranking(
        &self,
        submission: &Submission,
        entries: &[Arc<CorpusEntry>],
    ) -> CapabilityResult<Vec<SimilarityResult>> {
        let query = self.embed_cached(&submission.full_text()).await?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let vector = self.embed_cached(&entry.full_text()).await?;
            let similarity = cosine_similarity(&query, &vector);
            results.push(SimilarityResult::new(
                Arc::clone(entry),
                similarity,
                similarity * EMBEDDING_PARAPHRASE_FACTOR,
                SearchStrategy::Embedding,
            ));
        }

        Ok(rank(results))
    }

    /// Word-overlap ranking. Blends whole-text Jaccard with a Jaccard over the
    /// leading tokens, which approximates a title comparison.
    pub fn lexical_ranking(
        submission: &Submission,
        entries: &[Arc<CorpusEntry>],
    ) -> Vec<SimilarityResult> {
        let text = submission.full_text();
        let words = word_set(&text);
        let head = leading_word_set(&text, TITLE_PROXY_TOKENS);

        let results = entries
            .iter()
            .filter_map(|entry| {
                let entry_text = entry.full_text();
                let entry_words = word_set(&entry_text);
                if entry_words.is_empty() {
                    return None;
                }
                let full = jaccard(&words, &entry_words);
                let title = jaccard(&head, &leading_word_set(&entry_text, TITLE_PROXY_TOKENS));
                let combined = LEXICAL_FULL_WEIGHT * full + LEXICAL_TITLE_WEIGHT * title;
                if combined <= LEXICAL_MIN_SCORE {
                    return None;
                }
                Some(SimilarityResult::new(
                    Arc::clone(entry),
                    combined,
                    (combined * LEXICAL_PARAPHRASE_FACTOR).min(1.0),
                    SearchStrategy::Lexical,
                ))
            })
            .collect();

        rank(results)
    }

    async fn embed_cached(&self, text: &str) -> CapabilityResult<Arc<Vec<f32>>> {
        if let Some(hit) = self.cache.read().await.get(text) {
            return Ok(Arc::clone(hit));
        }

        let vector = Arc::new(self.embeddings.embed(text).await?);
        self.cache
            .write()
            .await
            .insert(text.to_string(), Arc::clone(&vector));
        Ok(vector)
    }

    pub async fn cached_embeddings(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Drop every cached embedding
    pub async fn release(&self) {
        let mut cache = self.cache.write().await;
        let released = cache.len();
        cache.clear();
        debug!("[SIMILARITY] Released {} cached embeddings", released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::screening::test_support::{sample_entry, StubEmbeddings};

    const ABSTRACT: &str =
        "A practical tour of async runtimes, executors and wakers for production Rust services.";

    fn submission() -> Submission {
        Submission::new("Async Rust runtimes explained", ABSTRACT, None).unwrap()
    }

    /// Maps text to a 3-d vector keyed on a few marker words
    fn keyword_embeddings() -> StubEmbeddings {
        StubEmbeddings::new(|text: &str| {
            let t = text.to_lowercase();
            vec![
                if t.contains("async") { 1.0 } else { 0.0 },
                if t.contains("garden") { 1.0 } else { 0.0 },
                if t.contains("runtime") { 0.5 } else { 0.0 },
            ]
        })
    }

    fn corpus() -> Vec<Arc<CorpusEntry>> {
        vec![
            sample_entry("Gardening with kids", "Growing tomatoes in a small garden plot."),
            sample_entry(
                "Async Rust deep dive",
                "Understanding async runtimes, executors and wakers in Rust.",
            ),
            sample_entry("Async basics", "An intro to async await syntax."),
        ]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        // Opposite vectors clamp to 0
        assert_eq!(cosine_similarity(&[1.0], &[-1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_embedding_ranking_sorted_and_scored() {
        let search = SimilaritySearch::new(Arc::new(keyword_embeddings()));
        let results = search.find_similar(&submission(), &corpus()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entry.title, "Async Rust deep dive");
        assert!(results.iter().all(|r| r.strategy == SearchStrategy::Embedding));
        for pair in results.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
        for r in &results {
            assert!((0.0..=1.0).contains(&r.similarity_score));
            assert!((r.paraphrase_likelihood - r.similarity_score * 0.8).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_results_truncated_to_five() {
        let entries: Vec<_> = (0..8)
            .map(|i| sample_entry(&format!("Async talk number {}", i), "Async executors"))
            .collect();
        let search = SimilaritySearch::new(Arc::new(keyword_embeddings()));
        let results = search.find_similar(&submission(), &entries).await;
        assert_eq!(results.len(), MAX_SIMILAR_RESULTS);
        // Equal scores keep insertion order
        assert_eq!(results[0].entry.title, "Async talk number 0");
        assert_eq!(results[4].entry.title, "Async talk number 4");
    }

    #[tokio::test]
    async fn test_embeddings_are_cached() {
        let stub = Arc::new(keyword_embeddings());
        let search = SimilaritySearch::new(stub.clone());
        let entries = corpus();

        search.find_similar(&submission(), &entries).await;
        assert_eq!(stub.call_count(), 4);
        search.find_similar(&submission(), &entries).await;
        assert_eq!(stub.call_count(), 4);
        assert_eq!(search.cached_embeddings().await, 4);

        search.release().await;
        assert_eq!(search.cached_embeddings().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_embeddings_fall_back_to_lexical() {
        let stub = Arc::new(StubEmbeddings::failing(CapabilityError::Unavailable("no key".into())));
        let search = SimilaritySearch::new(stub.clone());
        let results = search.find_similar(&submission(), &corpus()).await;

        assert_eq!(stub.call_count(), 1);
        assert!(!results.is_empty());
        assert!(results.len() <= MAX_SIMILAR_RESULTS);
        assert!(results.iter().all(|r| r.strategy == SearchStrategy::Lexical));
        assert_eq!(results[0].entry.title, "Async Rust deep dive");
        for r in &results {
            assert!(r.similarity_score > LEXICAL_MIN_SCORE);
            assert!((0.0..=1.0).contains(&r.paraphrase_likelihood));
        }
        // Unrelated gardening talk has no overlap worth reporting
        assert!(results.iter().all(|r| r.entry.title != "Gardening with kids"));
    }

    #[tokio::test]
    async fn test_empty_corpus_makes_no_calls() {
        let stub = Arc::new(keyword_embeddings());
        let search = SimilaritySearch::new(stub.clone());
        let results = search.find_similar(&submission(), &[]).await;
        assert!(results.is_empty());
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_search_uses_lexical() {
        let stub = Arc::new(keyword_embeddings());
        let search = SimilaritySearch::new(stub.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = search
            .find_similar_with_cancel(&submission(), &corpus(), &cancel)
            .await;
        assert_eq!(stub.call_count(), 0);
        assert!(results.iter().all(|r| r.strategy == SearchStrategy::Lexical));
    }

    #[tokio::test]
    async fn test_cancel_during_slow_embedding_uses_lexical() {
        let stub = Arc::new(keyword_embeddings().with_delay(std::time::Duration::from_secs(10)));
        let search = SimilaritySearch::new(stub.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let results = search
            .find_similar_with_cancel(&submission(), &corpus(), &cancel)
            .await;

        assert!(started.elapsed() < std::time::Duration::from_secs(1));
        assert_eq!(stub.call_count(), 1);
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.strategy == SearchStrategy::Lexical));
        assert_eq!(search.cached_embeddings().await, 0);
    }

    #[test]
    fn test_lexical_identical_text_scores_one() {
        let sub = submission();
        let twin = Arc::new(
            CorpusEntry::new("Async Rust runtimes explained", "manual").with_abstract(ABSTRACT),
        );
        let results = SimilaritySearch::lexical_ranking(&sub, &[twin]);
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity_score - 1.0).abs() < 1e-9);
        assert_eq!(results[0].paraphrase_likelihood, 1.0);
    }
}
