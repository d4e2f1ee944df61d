use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::fetch::BulkProcessor;

/// Fetches yesterday's snapshot for every configured asset and logs the
/// refreshed monthly range.
pub async fn run(processor: &BulkProcessor, db: &Database, assets: &[String]) -> Result<()> {
    let yesterday = Utc::now()
        .date_naive()
        .pred_opt()
        .context("Date underflow computing yesterday")?;

    info!(
        "Daily fetch: {} assets for {}",
        assets.len(),
        yesterday
    );

    let report = processor
        .run(yesterday, yesterday, assets, CancellationToken::new())
        .await?;

    for failure in &report.failures {
        warn!(
            "Daily fetch failed for {} on {}: {}",
            failure.task.asset_id, failure.task.date, failure.error
        );
    }

    let year = yesterday.year();
    let month = yesterday.month() as i32;
    for asset in assets {
        if let Some(agg) = db.postgres.get_monthly_aggregate(asset, year, month).await? {
            info!(
                "{} {}-{:02}: min {} max {}",
                asset, agg.year, agg.month, agg.min_price, agg.max_price
            );
        }
    }

    Ok(())
}
