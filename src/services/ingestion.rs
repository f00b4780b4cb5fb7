// Corpus Ingestion Service
// Best-effort crawling of historical talks from Sched and Sessionize

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::models::CorpusEntry;
use crate::services::config_store::{IngestionConfig, PlatformConfig};
use crate::services::corpus_store::CorpusStore;
use crate::services::providers::{get_api_key, ProviderError};
use crate::services::text_processor::normalize_whitespace;

const PLATFORM_TIMEOUT_SECS: u64 = 10;

static YEAR_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn leading_year(date: &str) -> Option<i32> {
    let re = YEAR_RE
        .get_or_init(|| Regex::new(r"^(\d{4})-").ok())
        .as_ref()?;
    re.captures(date)?.get(1)?.as_str().parse().ok()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Identifier values may arrive as strings or numbers
fn id_field(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkPlatform {
    Sched,
    Sessionize,
}

impl TalkPlatform {
    pub const ALL: [TalkPlatform; 2] = [TalkPlatform::Sched, TalkPlatform::Sessionize];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sched => "sched",
            Self::Sessionize => "sessionize",
        }
    }

    /// Listing URL without query parameters
    pub fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::Sched => format!("{}/events", base),
            Self::Sessionize => format!("{}/sessions", base),
        }
    }

    /// Query parameter that scopes a listing to one conference/event
    pub fn conference_param(self) -> &'static str {
        match self {
            Self::Sched => "conference",
            Self::Sessionize => "eventId",
        }
    }

    /// Convert a listing payload into corpus entries. Records without a title are skipped.
    pub fn parse_listing(self, payload: &Value, limit: usize) -> Vec<CorpusEntry> {
        let list_key = match self {
            Self::Sched => "events",
            Self::Sessionize => "sessions",
        };
        let Some(records) = payload.get(list_key).and_then(Value::as_array) else {
            return Vec::new();
        };

        let fetched_at = chrono::Utc::now();
        records
            .iter()
            .take(limit)
            .filter_map(|record| {
                let mut entry = match self {
                    Self::Sched => Self::parse_sched(record)?,
                    Self::Sessionize => Self::parse_sessionize(record)?,
                };
                if let Some(id) = id_field(record) {
                    entry.id = format!("{}-{}", self.as_str(), id);
                }
                entry.url = str_field(record, "url").map(str::to_string);
                entry.fetched_at = Some(fetched_at);
                Some(entry)
            })
            .collect()
    }

    fn parse_sched(event: &Value) -> Option<CorpusEntry> {
        let title = str_field(event, "name")?;
        let mut entry = CorpusEntry::new(title, Self::Sched.as_str());
        entry.abstract_text = str_field(event, "description").map(normalize_whitespace);
        entry.speaker = event
            .get("speakers")
            .and_then(|s| s.get(0))
            .and_then(|s| str_field(s, "name"))
            .map(str::to_string);
        entry.conference = event
            .get("conference")
            .and_then(|c| str_field(c, "name"))
            .map(str::to_string);
        entry.year = str_field(event, "start_time").and_then(leading_year);
        Some(entry)
    }

    fn parse_sessionize(session: &Value) -> Option<CorpusEntry> {
        let title = str_field(session, "title")?;
        let mut entry = CorpusEntry::new(title, Self::Sessionize.as_str());
        entry.abstract_text = str_field(session, "description").map(normalize_whitespace);
        let speakers: Vec<&str> = session
            .get("speakers")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|s| str_field(s, "name")).collect())
            .unwrap_or_default();
        if !speakers.is_empty() {
            entry.speaker = Some(speakers.join(", "));
        }
        let event = session.get("event");
        entry.conference = event
            .and_then(|e| str_field(e, "name"))
            .map(str::to_string);
        entry.year = event
            .and_then(|e| str_field(e, "startDate"))
            .and_then(leading_year);
        Some(entry)
    }
}

/// Source of historical talks. Failures are absorbed: an unreachable
/// source contributes nothing.
#[async_trait]
pub trait CorpusIngestion: Send + Sync {
    async fn fetch_all(&self) -> Vec<CorpusEntry>;
}

#[derive(Debug, Clone)]
struct PlatformTarget {
    platform: TalkPlatform,
    base_url: String,
    conference: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub fetched: usize,
    pub stored: usize,
    pub corpus_size: usize,
    pub platforms: Vec<TalkPlatform>,
}

pub struct PlatformCrawler {
    client: Client,
    targets: Vec<PlatformTarget>,
    limit_per_platform: usize,
}

impl PlatformCrawler {
    pub fn from_config(
        config: &IngestionConfig,
        proxy_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(PLATFORM_TIMEOUT_SECS));
        if let Some(url) = proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(url)?);
        }
        let client = builder.build()?;

        let targets = TalkPlatform::ALL
            .into_iter()
            .filter_map(|platform| {
                let cfg: &PlatformConfig = match platform {
                    TalkPlatform::Sched => &config.sched,
                    TalkPlatform::Sessionize => &config.sessionize,
                };
                cfg.enabled.then(|| PlatformTarget {
                    platform,
                    base_url: cfg.base_url.clone(),
                    conference: cfg.conference.clone(),
                    api_key: get_api_key(platform.as_str()),
                })
            })
            .collect();

        Ok(Self {
            client,
            targets,
            limit_per_platform: config.limit_per_platform,
        })
    }

    pub fn platforms(&self) -> Vec<TalkPlatform> {
        self.targets.iter().map(|t| t.platform).collect()
    }

    async fn fetch_by_platform(&self) -> Vec<(TalkPlatform, Vec<CorpusEntry>)> {
        let mut join_set: JoinSet<(usize, TalkPlatform, Vec<CorpusEntry>)> = JoinSet::new();
        for (index, target) in self.targets.iter().cloned().enumerate() {
            let client = self.client.clone();
            let limit = self.limit_per_platform;
            join_set.spawn(async move {
                let entries = fetch_best_effort(&client, &target, limit).await;
                (index, target.platform, entries)
            });
        }

        let mut slots: Vec<Option<(TalkPlatform, Vec<CorpusEntry>)>> =
            self.targets.iter().map(|_| None).collect();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((index, platform, entries)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some((platform, entries));
                    }
                }
                Err(e) => warn!("[INGESTION] Platform fetch task failed: {}", e),
            }
        }

        // Config order, with an empty listing for any task that panicked
        self.targets
            .iter()
            .zip(slots)
            .map(|(target, slot)| slot.unwrap_or_else(|| (target.platform, Vec::new())))
            .collect()
    }

    /// Fetch every enabled platform and insert the results into `store`
    pub async fn crawl_into(&self, store: &mut CorpusStore) -> CrawlSummary {
        let mut summary = CrawlSummary::default();
        for (platform, entries) in self.fetch_by_platform().await {
            if entries.is_empty() {
                continue;
            }
            summary.fetched += entries.len();
            summary.platforms.push(platform);
            summary.stored += store.add_entries(entries);
        }
        summary.corpus_size = store.size();
        info!(
            "[INGESTION] Crawl complete: fetched={} stored={} corpus={}",
            summary.fetched, summary.stored, summary.corpus_size
        );
        summary
    }
}

fn listing_request(client: &Client, target: &PlatformTarget) -> RequestBuilder {
    let mut request = client.get(target.platform.endpoint(&target.base_url));
    if let Some(conference) = &target.conference {
        request = request.query(&[(target.platform.conference_param(), conference.as_str())]);
    }
    if let Some(key) = &target.api_key {
        request = request.header("Authorization", format!("Bearer {}", key));
    }
    request
}

async fn fetch_platform(
    client: &Client,
    target: &PlatformTarget,
    limit: usize,
) -> Result<Vec<CorpusEntry>, ProviderError> {
    let response = listing_request(client, target).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    let payload: Value = response
        .json()
        .await
        .map_err(|e| ProviderError::JsonError(e.to_string()))?;
    Ok(target.platform.parse_listing(&payload, limit))
}

async fn fetch_best_effort(
    client: &Client,
    target: &PlatformTarget,
    limit: usize,
) -> Vec<CorpusEntry> {
    let name = target.platform.as_str();
    match fetch_platform(client, target, limit).await {
        Ok(entries) => {
            info!("[INGESTION] {} returned {} talks", name, entries.len());
            entries
        }
        Err(e) => {
            warn!("[INGESTION] {} fetch failed: {}", name, e);
            Vec::new()
        }
    }
}

#[async_trait]
impl CorpusIngestion for PlatformCrawler {
    async fn fetch_all(&self) -> Vec<CorpusEntry> {
        self.fetch_by_platform()
            .await
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect()
    }
}
