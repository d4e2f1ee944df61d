use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use serde_json::Value;

use crate::db::models::{MonthlyAggregate, NewSnapshot};
use crate::db::postgres::PostgresClient;
use crate::db::{PersistError, PersistOutcome, SnapshotStore};

fn db_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> PersistError {
    PersistError::Database(e.into())
}

impl PostgresClient {
    /// Insert a raw snapshot and widen its monthly aggregate in a single
    /// transaction, so a crash between the two writes cannot leave one
    /// without the other.
    ///
    /// The raw insert is conflict-on-key do-nothing; when the key already
    /// exists nothing is written and the aggregate is left untouched. The
    /// aggregate upsert widens min/max atomically at the store, which
    /// serializes concurrent widenings of the same (asset, year, month) row
    /// without a read-modify-write window.
    pub async fn insert_snapshot(
        &self,
        snapshot: &NewSnapshot,
    ) -> Result<PersistOutcome, PersistError> {
        let mut client = self.pool.get().await.map_err(db_err)?;
        let tx = client.transaction().await.map_err(db_err)?;

        let inserted = tx
            .execute(
                r#"
                INSERT INTO raw_snapshots (asset_id, date, price_usd, volume_usd, raw_json)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (asset_id, date) DO NOTHING
                "#,
                &[
                    &snapshot.asset_id,
                    &snapshot.date,
                    &snapshot.price_usd,
                    &snapshot.volume_usd,
                    &snapshot.raw_json,
                ],
            )
            .await
            .map_err(db_err)?;

        if inserted == 0 {
            tx.commit().await.map_err(db_err)?;
            return Ok(PersistOutcome::AlreadyExists);
        }

        let year = snapshot.date.year();
        let month = snapshot.date.month() as i32;
        tx.execute(
            r#"
            INSERT INTO monthly_aggregates (asset_id, year, month, max_price, min_price)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (asset_id, year, month) DO UPDATE SET
                max_price = GREATEST(monthly_aggregates.max_price, EXCLUDED.max_price),
                min_price = LEAST(monthly_aggregates.min_price, EXCLUDED.min_price),
                updated_at = now()
            "#,
            &[&snapshot.asset_id, &year, &month, &snapshot.price_usd],
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(PersistOutcome::Inserted)
    }

    /// Current monthly aggregate for one asset, if any snapshot of that
    /// month has been ingested.
    pub async fn get_monthly_aggregate(
        &self,
        asset_id: &str,
        year: i32,
        month: i32,
    ) -> anyhow::Result<Option<MonthlyAggregate>> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt(
                r#"
                SELECT asset_id, year, month, max_price, min_price
                FROM monthly_aggregates
                WHERE asset_id = $1 AND year = $2 AND month = $3
                "#,
                &[&asset_id, &year, &month],
            )
            .await?;

        Ok(row.map(|row| MonthlyAggregate {
            asset_id: row.get("asset_id"),
            year: row.get("year"),
            month: row.get("month"),
            max_price: row.get("max_price"),
            min_price: row.get("min_price"),
        }))
    }
}

#[async_trait]
impl SnapshotStore for PostgresClient {
    async fn persist(
        &self,
        asset_id: &str,
        date: NaiveDate,
        payload: Value,
    ) -> Result<PersistOutcome, PersistError> {
        let snapshot = NewSnapshot::from_payload(asset_id, date, payload)?;
        let outcome = self.insert_snapshot(&snapshot).await?;

        match outcome {
            PersistOutcome::Inserted => {
                info!("Stored snapshot for {} on {}", asset_id, date);
            },
            PersistOutcome::AlreadyExists => {
                debug!("Snapshot for {} on {} already stored", asset_id, date);
            },
        }

        Ok(outcome)
    }
}
