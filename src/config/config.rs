use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Remote history API configuration.
///
/// The endpoint template must contain an `{asset_id}` placeholder which is
/// substituted per request. The API key is sent in a configurable header and
/// omitted entirely when empty (public/demo endpoints).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub endpoint_template: String,
    pub key_header: String,
    pub key: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint_template: "https://api.coingecko.com/api/v3/coins/{asset_id}/history"
                .to_string(),
            key_header: "x-cg-demo-api-key".to_string(),
            key: String::new(),
            request_timeout_secs: 30,
        }
    }
}

/// Fetch pipeline configuration: pool size, throughput ceiling and retry
/// behavior.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetcherSettings {
    /// Maximum number of in-flight fetches.
    pub concurrent_requests: usize,
    /// Global ceiling on requests issued per 60-second window.
    pub requests_per_minute: u32,
    /// Fixed backoff before re-attempting a rate-limited task.
    pub retry_backoff_secs: u64,
    /// When set, a task gives up after this many 429 rejections instead of
    /// retrying forever.
    pub max_rate_limit_retries: Option<u32>,
    /// Default asset list for bulk fetches and the cron job.
    pub assets: Vec<String>,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            concurrent_requests: 20,
            requests_per_minute: 30,
            retry_backoff_secs: 10,
            max_rate_limit_retries: None,
            assets: vec![
                "bitcoin".to_string(),
                "ethereum".to_string(),
                "cardano".to_string(),
            ],
        }
    }
}

/// Daily scheduled fetch configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CronSettings {
    /// Six-field cron expression (sec min hour day month weekday).
    pub schedule: String,
    /// Assets fetched by the daily job; falls back to `fetcher.assets`.
    pub assets: Option<Vec<String>>,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            schedule: "0 0 3 * * *".to_string(),
            assets: None,
        }
    }
}

/// PostgreSQL database connection configuration.
///
/// Used for storing raw daily snapshots and monthly min/max aggregates.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup; any value can be overridden from
/// the environment with a `COINVAULT_` prefix (e.g.
/// `COINVAULT_FETCHER__REQUESTS_PER_MINUTE=30`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub cron: CronSettings,
    pub postgres: PostgresSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("COINVAULT").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    /// Assets the daily cron job should fetch.
    pub fn cron_assets(&self) -> &[String] {
        self.cron.assets.as_deref().unwrap_or(&self.fetcher.assets)
    }
}
