// CFP Guardian Data Models
// Submissions, corpus entries, search results, metric bundles and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Minimum title length (Unicode scalar count, trimmed)
pub const TITLE_MIN_CHARS: usize = 10;
/// Minimum abstract length (Unicode scalar count, trimmed)
pub const ABSTRACT_MIN_CHARS: usize = 50;

/// Clamp a score into [0, 1]. Non-finite values collapse to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn join_non_empty<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============ Submission ============

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("title must be at least {min} characters long (got {actual})")]
    TitleTooShort { min: usize, actual: usize },
    #[error("abstract must be at least {min} characters long (got {actual})")]
    AbstractTooShort { min: usize, actual: usize },
}

/// Raw submission fields as they arrive from a presentation layer
#[derive(Debug, Clone, Deserialize)]
struct SubmissionDraft {
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<SubmissionDraft> for Submission {
    type Error = SubmissionError;

    fn try_from(draft: SubmissionDraft) -> Result<Self, Self::Error> {
        Submission::new(draft.title, draft.abstract_text, draft.description)
    }
}

/// A talk proposal under review. Fields are validated on construction and
/// cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SubmissionDraft")]
pub struct Submission {
    title: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Submission {
    pub fn new(
        title: impl Into<String>,
        abstract_text: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, SubmissionError> {
        let submission = Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            description,
        };
        submission.validate()?;
        Ok(submission)
    }

    /// Re-check the minimum length rules
    pub fn validate(&self) -> Result<(), SubmissionError> {
        let title_len = self.title.trim().chars().count();
        if title_len < TITLE_MIN_CHARS {
            return Err(SubmissionError::TitleTooShort {
                min: TITLE_MIN_CHARS,
                actual: title_len,
            });
        }
        let abstract_len = self.abstract_text.trim().chars().count();
        if abstract_len < ABSTRACT_MIN_CHARS {
            return Err(SubmissionError::AbstractTooShort {
                min: ABSTRACT_MIN_CHARS,
                actual: abstract_len,
            });
        }
        Ok(())
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn abstract_text(&self) -> &str {
        &self.abstract_text
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Title, abstract and description joined by single spaces, empty parts skipped
    pub fn full_text(&self) -> String {
        join_non_empty([
            Some(self.title.as_str()),
            Some(self.abstract_text.as_str()),
            self.description.as_deref(),
        ])
    }
}

// ============ Corpus Entry ============

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A previously accepted talk used as comparison baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusEntry {
    #[serde(default = "new_entry_id")]
    pub id: String,
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub conference: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Origin platform name, e.g. "sched", "sessionize", "manual"
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CorpusEntry {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: new_entry_id(),
            title: title.into(),
            abstract_text: None,
            description: None,
            speaker: None,
            conference: None,
            year: None,
            source: source.into(),
            url: None,
            fetched_at: None,
        }
    }

    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = Some(abstract_text.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_conference(mut self, conference: impl Into<String>, year: Option<i32>) -> Self {
        self.conference = Some(conference.into());
        self.year = year;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn full_text(&self) -> String {
        join_non_empty([
            Some(self.title.as_str()),
            self.abstract_text.as_deref(),
            self.description.as_deref(),
        ])
    }

    /// Identity used for duplicate suppression: lower-cased title plus url
    pub fn dedup_key(&self) -> (String, Option<String>) {
        (self.title.to_lowercase(), self.url.clone())
    }
}

// ============ Similarity Search ============

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Embedding,
    Lexical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResult {
    pub entry: Arc<CorpusEntry>,
    pub similarity_score: f64,
    pub paraphrase_likelihood: f64,
    pub strategy: SearchStrategy,
}

impl SimilarityResult {
    pub fn new(
        entry: Arc<CorpusEntry>,
        similarity_score: f64,
        paraphrase_likelihood: f64,
        strategy: SearchStrategy,
    ) -> Self {
        Self {
            entry,
            similarity_score: clamp_unit(similarity_score),
            paraphrase_likelihood: clamp_unit(paraphrase_likelihood),
            strategy,
        }
    }
}

// ============ Metrics ============

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    SemanticSimilarity,
    ParaphraseLikelihood,
    AiGeneration,
    Originality,
}

impl MetricKind {
    /// Score substituted when the metric cannot be evaluated.
    pub fn default_score(self) -> f64 {
        match self {
            Self::Originality => 0.5,
            _ => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SemanticSimilarity => "semantic similarity",
            Self::ParaphraseLikelihood => "paraphrase likelihood",
            Self::AiGeneration => "AI generation probability",
            Self::Originality => "originality score",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    pub score: f64,
    pub explanation: String,
    #[serde(default)]
    pub degraded: bool,
}

impl MetricResult {
    pub fn new(score: f64, explanation: impl Into<String>) -> Self {
        Self {
            score: clamp_unit(score),
            explanation: explanation.into(),
            degraded: false,
        }
    }

    /// Default value for a metric whose evaluation did not succeed
    pub fn degraded(kind: MetricKind, explanation: impl Into<String>) -> Self {
        Self {
            score: kind.default_score(),
            explanation: explanation.into(),
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySimilarity {
    pub entry_id: String,
    pub title: String,
    pub result: MetricResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSimilarity {
    pub entries: Vec<EntrySimilarity>,
    pub max_score: f64,
    pub explanation: String,
}

impl SemanticSimilarity {
    /// True when every per-entry score is a substituted default
    pub fn is_degraded(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.result.degraded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBundle {
    pub semantic_similarity: SemanticSimilarity,
    pub paraphrase_likelihood: MetricResult,
    pub ai_generation_probability: MetricResult,
    pub originality_score: MetricResult,
}

// ============ Risk ============

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "standard review")]
    StandardReview,
    #[serde(rename = "attention recommended")]
    AttentionRecommended,
    #[serde(rename = "attention required")]
    AttentionRequired,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StandardReview => "standard review",
            Self::AttentionRecommended => "attention recommended",
            Self::AttentionRequired => "attention required",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub concerns: Vec<String>,
}

// ============ Analysis Report ============

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub similar_talks: Vec<SimilarityResult>,
    pub metrics: MetricsBundle,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub concerns: Vec<String>,
}
