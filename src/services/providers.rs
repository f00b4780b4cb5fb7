// Capability Provider Service
// HTTP clients for the metric evaluator and the embedding backend

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::models::MetricResult;
use crate::services::capability::{
    CapabilityError, CapabilityResult, EmbeddingProvider, MetricEvaluator,
};
use crate::services::config_store::{ConfigStore, EmbeddingConfig, EvaluatorConfig};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured")]
    MissingApiKey,
    #[error("capability disabled in configuration")]
    Disabled,
}

impl From<ProviderError> for CapabilityError {
    fn from(err: ProviderError) -> Self {
        let terminal = match &err {
            ProviderError::MissingApiKey | ProviderError::Disabled => true,
            ProviderError::ApiError { status, .. } => {
                *status == StatusCode::UNAUTHORIZED.as_u16()
                    || *status == StatusCode::FORBIDDEN.as_u16()
            }
            _ => false,
        };
        if terminal {
            CapabilityError::Unavailable(err.to_string())
        } else {
            CapabilityError::EvaluationFailed(err.to_string())
        }
    }
}

fn build_client(timeout_secs: u64, proxy_url: Option<&str>) -> Result<Client, ProviderError> {
    let mut builder = Client::builder().timeout(Duration::from_secs(timeout_secs.max(1)));
    if let Some(url) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::all(url)?);
    }
    Ok(builder.build()?)
}

async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &T,
) -> Result<Value, ProviderError> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    let start = Instant::now();
    let response = request.send().await?;
    let status = response.status();
    debug!("POST {} -> {} in {}ms", url, status, start.elapsed().as_millis());

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::JsonError(e.to_string()))
}

// ============ Metric Evaluator ============

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    text1: &'a str,
    text2: &'a str,
    metric: &'static str,
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_texts: Option<&'a [String]>,
    metric: &'static str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: Option<f64>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parse an evaluator response body into a metric result
fn parse_score(body: Value, metric: &str) -> Result<MetricResult, ProviderError> {
    let parsed: ScoreResponse =
        serde_json::from_value(body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
    let score = parsed.score.ok_or(ProviderError::MissingContent)?;
    let explanation = parsed
        .explanation
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| format!("{} evaluated", metric));
    Ok(MetricResult::new(score, explanation))
}

/// Remote scoring service speaking the `/evaluate/*` JSON protocol
pub struct EvaluatorClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    enabled: bool,
}

impl EvaluatorClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            enabled: true,
        }
    }

    pub fn from_config(
        config: &EvaluatorConfig,
        proxy_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout_secs, proxy_url)?;
        let mut evaluator = Self::new(client, config.base_url.clone(), get_api_key("evaluator"));
        evaluator.enabled = config.enabled;
        Ok(evaluator)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/evaluate/{}", self.base_url, path)
    }

    fn credentials(&self) -> Result<&str, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::Disabled);
        }
        self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        path: &str,
        metric: &str,
        body: &T,
    ) -> Result<MetricResult, ProviderError> {
        let key = self.credentials()?;
        let value = post_json(&self.client, &self.endpoint(path), Some(key), body).await?;
        parse_score(value, metric)
    }
}

#[async_trait]
impl MetricEvaluator for EvaluatorClient {
    async fn similarity(&self, text_a: &str, text_b: &str) -> CapabilityResult<MetricResult> {
        let body = PairRequest {
            text1: text_a,
            text2: text_b,
            metric: "semantic_similarity",
        };
        Ok(self.call("similarity", body.metric, &body).await?)
    }

    async fn paraphrase(&self, text_a: &str, text_b: &str) -> CapabilityResult<MetricResult> {
        let body = PairRequest {
            text1: text_a,
            text2: text_b,
            metric: "paraphrase_detection",
        };
        Ok(self.call("paraphrase", body.metric, &body).await?)
    }

    async fn ai_generation(&self, text: &str) -> CapabilityResult<MetricResult> {
        let body = TextRequest {
            text,
            reference_texts: None,
            metric: "ai_generation",
        };
        Ok(self.call("ai-detection", body.metric, &body).await?)
    }

    async fn originality(
        &self,
        text: &str,
        reference_texts: &[String],
    ) -> CapabilityResult<MetricResult> {
        let body = TextRequest {
            text,
            reference_texts: Some(reference_texts),
            metric: "originality",
        };
        Ok(self.call("originality", body.metric, &body).await?)
    }
}

// ============ Embeddings ============

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Extract `data[0].embedding` from an OpenAI-compatible response
fn parse_embedding(body: &Value) -> Result<Vec<f32>, ProviderError> {
    let values = body
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("embedding"))
        .and_then(Value::as_array)
        .ok_or(ProviderError::MissingContent)?;

    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| {
                    ProviderError::JsonError("non-numeric embedding component".to_string())
                })
        })
        .collect()
}

/// OpenAI-compatible `/embeddings` endpoint
pub struct HttpEmbeddingProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    enabled: bool,
}

impl HttpEmbeddingProvider {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            enabled: true,
        }
    }

    pub fn from_config(
        config: &EmbeddingConfig,
        proxy_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let client = build_client(config.timeout_secs, proxy_url)?;
        let mut provider = Self::new(
            client,
            config.base_url.clone(),
            config.model.clone(),
            get_api_key("embedding"),
        );
        provider.enabled = config.enabled;
        Ok(provider)
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if !self.enabled {
            return Err(ProviderError::Disabled);
        }
        let key = self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)?;
        let body = EmbeddingRequest { model: &self.model, input: text };
        let url = format!("{}/embeddings", self.base_url);
        let value = post_json(&self.client, &url, Some(key), &body).await?;
        parse_embedding(&value)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        Ok(self.request(text).await?)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Get API key from environment or config file
pub fn get_api_key(capability: &str) -> Option<String> {
    // Try environment variables first
    let env_keys: &[&str] = match capability {
        "evaluator" => &["EVALUATOR_API_KEY", "CFP_GUARDIAN_EVALUATOR_API_KEY"],
        "embedding" => &["EMBEDDING_API_KEY", "OPENAI_API_KEY"],
        "sched" => &["SCHED_API_KEY"],
        "sessionize" => &["SESSIONIZE_API_KEY"],
        _ => &[],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    // Try config file
    if let Some(config_dir) = ConfigStore::default_config_dir() {
        let store = ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(capability) {
            return Some(key);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_classification() {
        let unauthorized = ProviderError::ApiError { status: 401, message: "bad key".into() };
        assert!(CapabilityError::from(unauthorized).is_terminal());
        assert!(CapabilityError::from(ProviderError::MissingApiKey).is_terminal());
        assert!(CapabilityError::from(ProviderError::Disabled).is_terminal());

        let server = ProviderError::ApiError { status: 503, message: "overloaded".into() };
        assert!(!CapabilityError::from(server).is_terminal());
        assert!(!CapabilityError::from(ProviderError::MissingContent).is_terminal());
    }

    #[test]
    fn test_parse_score() {
        let body = json!({"score": 1.4, "explanation": "near copy"});
        let result = parse_score(body, "similarity").unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.explanation, "near copy");

        let result = parse_score(json!({"score": 0.3}), "originality").unwrap();
        assert_eq!(result.explanation, "originality evaluated");

        assert!(matches!(
            parse_score(json!({"explanation": "no score"}), "x"),
            Err(ProviderError::MissingContent)
        ));
    }

    #[test]
    fn test_request_payloads() {
        let pair = PairRequest { text1: "a", text2: "b", metric: "paraphrase_detection" };
        assert_eq!(
            serde_json::to_value(&pair).unwrap(),
            json!({"text1": "a", "text2": "b", "metric": "paraphrase_detection"})
        );

        let refs = vec!["r1".to_string()];
        let text = TextRequest { text: "t", reference_texts: Some(&refs), metric: "originality" };
        assert_eq!(
            serde_json::to_value(&text).unwrap(),
            json!({"text": "t", "reference_texts": ["r1"], "metric": "originality"})
        );

        let ai = TextRequest { text: "t", reference_texts: None, metric: "ai_generation" };
        assert_eq!(
            serde_json::to_value(&ai).unwrap(),
            json!({"text": "t", "metric": "ai_generation"})
        );
    }

    #[test]
    fn test_parse_embedding() {
        let body = json!({"data": [{"embedding": [0.5, -1.0, 2.0]}]});
        assert_eq!(parse_embedding(&body).unwrap(), vec![0.5f32, -1.0, 2.0]);
        assert!(parse_embedding(&json!({"data": []})).is_err());
        assert!(parse_embedding(&json!({"data": [{"embedding": ["x"]}]})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let evaluator = EvaluatorClient::new(Client::new(), "http://127.0.0.1:9/", None);
        assert_eq!(evaluator.endpoint("ai-detection"), "http://127.0.0.1:9/evaluate/ai-detection");
        let err = evaluator.ai_generation("text").await.unwrap_err();
        assert!(err.is_terminal());

        let mut embeddings =
            HttpEmbeddingProvider::new(Client::new(), "http://127.0.0.1:9", "m", Some("k".into()));
        embeddings.enabled = false;
        assert!(embeddings.embed("text").await.unwrap_err().is_terminal());
    }
}
