// Risk Aggregation
// Turns a metrics bundle into review guidance. Never accepts or rejects.

use tracing::debug;

use crate::models::{MetricsBundle, RiskAssessment, RiskLevel};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Direction {
    /// Risk grows with the score
    Above,
    /// Risk grows as the score falls
    Below,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum Severity {
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy)]
struct Gate {
    high: f64,
    moderate: f64,
    direction: Direction,
    high_label: &'static str,
    moderate_label: &'static str,
}

impl Gate {
    fn severity(&self, score: f64) -> Option<Severity> {
        let (high, moderate) = match self.direction {
            Direction::Above => (score > self.high, score > self.moderate),
            Direction::Below => (score < self.high, score < self.moderate),
        };
        if high {
            Some(Severity::High)
        } else if moderate {
            Some(Severity::Moderate)
        } else {
            None
        }
    }
}

// Table order is also concern order
const SEMANTIC_GATE: Gate = Gate {
    high: 0.8,
    moderate: 0.6,
    direction: Direction::Above,
    high_label: "HIGH semantic similarity with historical talks",
    moderate_label: "MODERATE semantic similarity detected",
};
const PARAPHRASE_GATE: Gate = Gate {
    high: 0.7,
    moderate: 0.5,
    direction: Direction::Above,
    high_label: "HIGH paraphrase likelihood",
    moderate_label: "MODERATE paraphrase likelihood",
};
const AI_GENERATION_GATE: Gate = Gate {
    high: 0.7,
    moderate: 0.5,
    direction: Direction::Above,
    high_label: "HIGH AI generation confidence",
    moderate_label: "MODERATE AI generation confidence",
};
const ORIGINALITY_GATE: Gate = Gate {
    high: 0.4,
    moderate: 0.6,
    direction: Direction::Below,
    high_label: "LOW originality score",
    moderate_label: "MODERATE originality score",
};

pub const RECOMMENDATION_REQUIRED: &str = "REVIEWER ATTENTION REQUIRED - Multiple high-risk factors detected. Please review carefully for originality, duplication, and content quality.";
pub const RECOMMENDATION_RECOMMENDED: &str = "REVIEWER ATTENTION RECOMMENDED - Some concerns detected. Please verify originality and content quality.";
pub const RECOMMENDATION_STANDARD: &str = "STANDARD REVIEW - No significant concerns detected. Proceed with normal review process.";

#[derive(Debug, Default, Clone, Copy)]
pub struct RiskAggregator;

impl RiskAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, bundle: &MetricsBundle) -> RiskAssessment {
        let checks = [
            (SEMANTIC_GATE, bundle.semantic_similarity.max_score),
            (PARAPHRASE_GATE, bundle.paraphrase_likelihood.score),
            (AI_GENERATION_GATE, bundle.ai_generation_probability.score),
            (ORIGINALITY_GATE, bundle.originality_score.score),
        ];

        let mut concerns = Vec::new();
        let mut flagged = 0usize;
        let mut any_high = false;
        for (gate, score) in checks {
            let Some(severity) = gate.severity(score) else {
                continue;
            };
            flagged += 1;
            any_high |= severity == Severity::High;
            let label = match severity {
                Severity::High => gate.high_label,
                Severity::Moderate => gate.moderate_label,
            };
            concerns.push(format!("{} ({:.2})", label, score));
        }

        let risk_level = if any_high || flagged >= 3 {
            RiskLevel::AttentionRequired
        } else if flagged == 2 {
            RiskLevel::AttentionRecommended
        } else {
            RiskLevel::StandardReview
        };

        let recommendation = match risk_level {
            RiskLevel::AttentionRequired => RECOMMENDATION_REQUIRED,
            RiskLevel::AttentionRecommended => RECOMMENDATION_RECOMMENDED,
            RiskLevel::StandardReview => RECOMMENDATION_STANDARD,
        };

        debug!("[RISK] {} with {} concerns", risk_level, concerns.len());

        RiskAssessment {
            risk_level,
            recommendation: recommendation.to_string(),
            concerns,
        }
    }
}
