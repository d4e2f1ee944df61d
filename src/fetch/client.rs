use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::ApiSettings;

/// Result of a single remote history lookup, classified by the client.
///
/// Only `RateLimited` is transient; the retry path owns it. The client never
/// retries internally and has no side effects beyond the network call.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(Value),
    RateLimited,
    HttpError { status: u16, body: String },
    TransportError(String),
}

/// One remote lookup for an (asset, date) pair.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch(&self, asset_id: &str, date: NaiveDate) -> FetchOutcome;
}

/// HTTP implementation backed by a CoinGecko-style history endpoint.
pub struct HttpHistorySource {
    http: Client,
    endpoint_template: String,
    key_header: String,
    key: String,
}

impl HttpHistorySource {
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        // Fail at startup on a template that cannot yield a valid URL.
        let probe = settings.endpoint_template.replace("{asset_id}", "probe");
        Url::parse(&probe).context("Invalid API endpoint template")?;

        Ok(Self {
            http,
            endpoint_template: settings.endpoint_template.clone(),
            key_header: settings.key_header.clone(),
            key: settings.key.clone(),
        })
    }

    /// The remote expects the date as DD-MM-YYYY.
    fn history_url(&self, asset_id: &str, date: NaiveDate) -> String {
        let base = self.endpoint_template.replace("{asset_id}", asset_id);
        format!("{}?date={}", base, date.format("%d-%m-%Y"))
    }
}

#[async_trait]
impl HistorySource for HttpHistorySource {
    async fn fetch(&self, asset_id: &str, date: NaiveDate) -> FetchOutcome {
        let url = self.history_url(asset_id, date);

        let mut request = self.http.get(&url);
        if !self.key.is_empty() {
            request = request.header(&self.key_header, &self.key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::TransportError(e.to_string()),
        };

        let status = response.status().as_u16();
        if status == 200 {
            match response.json::<Value>().await {
                Ok(payload) => FetchOutcome::Success(payload),
                Err(e) => FetchOutcome::TransportError(format!("Body decode failed: {}", e)),
            }
        } else {
            let body = response.text().await.unwrap_or_default();
            classify_error(status, body)
        }
    }
}

/// Maps a non-200 response to an outcome.
fn classify_error(status: u16, body: String) -> FetchOutcome {
    if status == 429 {
        FetchOutcome::RateLimited
    } else {
        FetchOutcome::HttpError { status, body }
    }
}
