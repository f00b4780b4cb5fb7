// Configuration Storage Service
// Handles config file read/write, version backup and environment overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::services::screening::RetryPolicy;

pub const DEFAULT_EVALUATOR_URL: &str = "http://127.0.0.1:8700";
pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_SCHED_URL: &str = "https://sched.com/api";
pub const DEFAULT_SESSIONIZE_URL: &str = "https://sessionize.com/api/v2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL to use, if the proxy is enabled
    pub fn active_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https.as_deref().or(self.http.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_evaluator_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff time unit; the wait before retry `n` is `unit * 2^n`
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_evaluator_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl EvaluatorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            attempt_timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionConfig {
    #[serde(default = "default_limit_per_platform")]
    pub limit_per_platform: usize,
    #[serde(default = "default_sched")]
    pub sched: PlatformConfig,
    #[serde(default = "default_sessionize")]
    pub sessionize: PlatformConfig,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            limit_per_platform: default_limit_per_platform(),
            sched: default_sched(),
            sessionize: default_sessionize(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    /// Platform-specific conference/event identifier
    #[serde(default)]
    pub conference: Option<String>,
}

fn default_true() -> bool { true }
fn default_evaluator_url() -> String { DEFAULT_EVALUATOR_URL.to_string() }
fn default_embedding_url() -> String { DEFAULT_EMBEDDING_URL.to_string() }
fn default_embedding_model() -> String { DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_backoff_unit_ms() -> u64 { 1000 }
fn default_limit_per_platform() -> usize { 100 }
fn default_sched() -> PlatformConfig {
    PlatformConfig { enabled: true, base_url: DEFAULT_SCHED_URL.to_string(), conference: None }
}
fn default_sessionize() -> PlatformConfig {
    PlatformConfig { enabled: true, base_url: DEFAULT_SESSIONIZE_URL.to_string(), conference: None }
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Apply `CFP_GUARDIAN_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_value("CFP_GUARDIAN_EVALUATOR_URL") {
            self.evaluator.base_url = url;
        }
        if let Some(secs) =
            env_value("CFP_GUARDIAN_EVALUATOR_TIMEOUT").and_then(|v| v.parse().ok())
        {
            self.evaluator.timeout_secs = secs;
        }
        if let Some(n) =
            env_value("CFP_GUARDIAN_EVALUATOR_MAX_RETRIES").and_then(|v| v.parse().ok())
        {
            self.evaluator.max_retries = n;
        }
        if let Some(flag) = env_value("CFP_GUARDIAN_EVALUATOR_ENABLED") {
            self.evaluator.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = env_value("CFP_GUARDIAN_EMBEDDING_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = env_value("CFP_GUARDIAN_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cfpGuardian"))
    }

    /// Load from the default location with environment overrides applied.
    /// Falls back to defaults when no config directory exists.
    pub fn load_effective() -> Result<AppConfig, ConfigError> {
        let mut config = match Self::default_config_dir() {
            Some(dir) => Self::new(dir).load()?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(|source| ConfigError::Io {
            path: self.config_dir.clone(),
            source,
        })
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(|source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;

        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)?;

        fs::write(&self.config_file, content).map_err(|source| ConfigError::Io {
            path: self.config_file.clone(),
            source,
        })
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(|source| ConfigError::Io {
            path: backup_dir.clone(),
            source,
        })?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(|source| ConfigError::Io {
            path: backup_file.clone(),
            source,
        })?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|source| ConfigError::Io {
                path: backup_dir.to_path_buf(),
                source,
            })?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Oldest first
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let remove_count = entries.len() - keep;
        for entry in entries.iter().take(remove_count) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get capability API key from config file
    pub fn get_api_key(&self, capability: &str) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(capability).cloned())
    }

    /// Store capability API key in config file
    pub fn set_api_key(&self, capability: &str, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.insert(capability.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete capability API key from config file
    pub fn delete_api_key(&self, capability: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.remove(capability);
        self.save(&config)
    }
}
