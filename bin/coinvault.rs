use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use jemallocator::Jemalloc;
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use coinvault::{
    loader, BulkProcessor, BulkReport, CronScheduler, Database, HttpHistorySource, Settings,
};

#[derive(Parser)]
#[command(name = "coinvault", about = "Daily crypto price snapshot collector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and store snapshots for every asset over a date range
    Fetch {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        /// Comma-separated asset ids; defaults to the configured list
        #[arg(long, value_delimiter = ',')]
        assets: Option<Vec<String>>,
    },
    /// Fetch and store a single (asset, date) snapshot
    FetchOne {
        #[arg(long)]
        asset: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Import previously downloaded JSON snapshot files from a directory
    Load {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Run the daily fetch schedule until interrupted
    Cron,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    let cli = Cli::parse();

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let db = Database::new(settings.clone())
        .await
        .context("Failed to initialize database connection")?;

    let source = Arc::new(HttpHistorySource::new(&settings.api)?);
    let processor = BulkProcessor::new(source, db.postgres.clone(), &settings.fetcher);

    match cli.command {
        Command::Fetch {
            start_date,
            end_date,
            assets,
        } => {
            let assets = assets.unwrap_or_else(|| settings.fetcher.assets.clone());
            run_bulk(processor, start_date, end_date, assets).await
        },
        Command::FetchOne { asset, date } => {
            processor
                .fetch_one(&asset, date)
                .await
                .map_err(anyhow::Error::new)
                .with_context(|| format!("Fetch failed for {} on {}", asset, date))?;
            info!("Stored snapshot for {} on {}", asset, date);
            Ok(())
        },
        Command::Load { dir } => {
            let report = loader::load_directory(&dir, db.postgres.as_ref()).await?;
            for failure in &report.failures {
                warn!("{}: {}", failure.file.display(), failure.reason);
            }
            Ok(())
        },
        Command::Cron => run_cron(processor, db, settings).await,
    }
}

async fn run_bulk(
    processor: BulkProcessor,
    start_date: NaiveDate,
    end_date: NaiveDate,
    assets: Vec<String>,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let mut runner = {
        let processor = processor.clone();
        let token = cancellation_token.clone();
        tokio::spawn(async move { processor.run(start_date, end_date, &assets, token).await })
    };

    let report = tokio::select! {
        result = &mut runner => result.context("Bulk fetch task failed")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, finishing in-flight fetches...");
            cancellation_token.cancel();
            (&mut runner).await.context("Bulk fetch task failed")??
        },
    };

    log_report(&report);
    Ok(())
}

fn log_report(report: &BulkReport) {
    info!(
        "Done: {}/{} tasks stored, {} failed",
        report.succeeded,
        report.total,
        report.failures.len()
    );
    for failure in &report.failures {
        warn!(
            "  {} on {}: {}",
            failure.task.asset_id, failure.task.date, failure.error
        );
    }
}

async fn run_cron(
    processor: BulkProcessor,
    db: Database,
    settings: Arc<Settings>,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let cron_scheduler = CronScheduler::new(processor, db, settings);
    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            log::error!("Cron scheduler failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Scheduler running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}
