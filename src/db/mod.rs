use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

/// Result of persisting one snapshot.
///
/// `AlreadyExists` means the (asset, date) key was seen before and the write
/// was suppressed; callers treat it as success so re-running a date range is
/// safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum PersistError {
    /// The payload is missing `market_data.current_price.usd` or
    /// `market_data.total_volume.usd`. Terminal, never retried.
    #[error("payload missing expected market data fields")]
    MalformedPayload,
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Sink for fetched snapshots.
///
/// Implementations must make `persist` idempotent per (asset, date) and keep
/// the monthly min/max aggregate consistent with every snapshot ingested so
/// far, under concurrent writers.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn persist(
        &self,
        asset_id: &str,
        date: NaiveDate,
        payload: Value,
    ) -> Result<PersistOutcome, PersistError>;
}

/// Database handle owning the PostgreSQL connection pool.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: Arc<Settings>) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;

        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
