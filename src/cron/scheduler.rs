//! Cron scheduler for the daily snapshot fetch.

use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::db::Database;
use crate::fetch::BulkProcessor;

use super::jobs;

/// Runs the daily fetch job on the configured schedule until cancelled.
pub struct CronScheduler {
    processor: BulkProcessor,
    db: Database,
    settings: Arc<Settings>,
}

impl CronScheduler {
    pub fn new(processor: BulkProcessor, db: Database, settings: Arc<Settings>) -> Self {
        Self {
            processor,
            db,
            settings,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_daily_fetch_job(&scheduler).await?;

        scheduler.start().await?;
        info!(
            "Cron scheduler started (schedule: {})",
            self.settings.cron.schedule
        );

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_daily_fetch_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let processor = self.processor.clone();
        let db = self.db.clone();
        let settings = self.settings.clone();
        let schedule = self.settings.cron.schedule.clone();

        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let processor = processor.clone();
            let db = db.clone();
            let settings = settings.clone();
            Box::pin(async move {
                if let Err(e) = jobs::daily_fetch::run(&processor, &db, settings.cron_assets()).await
                {
                    error!("Daily fetch job failed: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered daily_fetch job ({})", schedule);
        Ok(())
    }
}
