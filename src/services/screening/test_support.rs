// Test doubles for the capability traits

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{CorpusEntry, MetricResult};
use crate::services::capability::{
    CapabilityError, CapabilityResult, EmbeddingProvider, MetricEvaluator,
};

type EmbedFn = dyn Fn(&str) -> Vec<f32> + Send + Sync;

pub struct StubEmbeddings {
    embed_fn: Box<EmbedFn>,
    failure: Option<CapabilityError>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubEmbeddings {
    pub fn new(f: impl Fn(&str) -> Vec<f32> + Send + Sync + 'static) -> Self {
        Self {
            embed_fn: Box::new(f),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: CapabilityError) -> Self {
        Self {
            embed_fn: Box::new(|_| Vec::new()),
            failure: Some(err),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every embed call sleeps for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddings {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok((self.embed_fn)(text)),
        }
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    Fixed(f64),
    AlwaysFail(CapabilityError),
    FailThenSucceed { failures: usize, score: f64 },
    /// The first `successes` calls return `score`, later calls fail transiently
    SucceedThenFail { successes: usize, score: f64 },
    /// Sleeps before returning `score`
    Slow { delay: Duration, score: f64 },
}

#[derive(Debug)]
struct ScriptedMethod {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedMethod {
    fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    async fn run(&self, name: &str) -> CapabilityResult<MetricResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Fixed(score) => Ok(MetricResult::new(*score, format!("{} stub", name))),
            Script::AlwaysFail(err) => Err(err.clone()),
            Script::FailThenSucceed { failures, score } => {
                if call < *failures {
                    Err(CapabilityError::EvaluationFailed(format!("{} transient", name)))
                } else {
                    Ok(MetricResult::new(*score, format!("{} recovered", name)))
                }
            }
            Script::SucceedThenFail { successes, score } => {
                if call < *successes {
                    Ok(MetricResult::new(*score, format!("{} stub", name)))
                } else {
                    Err(CapabilityError::EvaluationFailed(format!("{} HTTP 500", name)))
                }
            }
            Script::Slow { delay, score } => {
                tokio::time::sleep(*delay).await;
                Ok(MetricResult::new(*score, format!("{} slow", name)))
            }
        }
    }

    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScriptedEvaluator {
    similarity: ScriptedMethod,
    paraphrase: ScriptedMethod,
    ai_generation: ScriptedMethod,
    originality: ScriptedMethod,
}

impl ScriptedEvaluator {
    pub fn new(
        similarity: Script,
        paraphrase: Script,
        ai_generation: Script,
        originality: Script,
    ) -> Self {
        Self {
            similarity: ScriptedMethod::new(similarity),
            paraphrase: ScriptedMethod::new(paraphrase),
            ai_generation: ScriptedMethod::new(ai_generation),
            originality: ScriptedMethod::new(originality),
        }
    }

    pub fn fixed(similarity: f64, paraphrase: f64, ai_generation: f64, originality: f64) -> Self {
        Self::new(
            Script::Fixed(similarity),
            Script::Fixed(paraphrase),
            Script::Fixed(ai_generation),
            Script::Fixed(originality),
        )
    }

    pub fn similarity_calls(&self) -> usize {
        self.similarity.count()
    }

    pub fn paraphrase_calls(&self) -> usize {
        self.paraphrase.count()
    }

    pub fn ai_generation_calls(&self) -> usize {
        self.ai_generation.count()
    }

    pub fn originality_calls(&self) -> usize {
        self.originality.count()
    }
}

#[async_trait]
impl MetricEvaluator for ScriptedEvaluator {
    async fn similarity(&self, _a: &str, _b: &str) -> CapabilityResult<MetricResult> {
        self.similarity.run("similarity").await
    }

    async fn paraphrase(&self, _a: &str, _b: &str) -> CapabilityResult<MetricResult> {
        self.paraphrase.run("paraphrase").await
    }

    async fn ai_generation(&self, _text: &str) -> CapabilityResult<MetricResult> {
        self.ai_generation.run("ai_generation").await
    }

    async fn originality(&self, _text: &str, _refs: &[String]) -> CapabilityResult<MetricResult> {
        self.originality.run("originality").await
    }
}

pub fn sample_entry(title: &str, abstract_text: &str) -> Arc<CorpusEntry> {
    Arc::new(
        CorpusEntry::new(title, "manual")
            .with_abstract(abstract_text)
            .with_url(format!("https://talks.example/{}", title.to_lowercase().replace(' ', "-"))),
    )
}
