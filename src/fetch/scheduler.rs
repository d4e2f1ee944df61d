use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::db::{PersistError, PersistOutcome, SnapshotStore};
use crate::fetch::client::{FetchOutcome, HistorySource};
use crate::fetch::rate_limit::RateLimiter;
use crate::fetch::retry::{RetryDecision, RetryPolicy};

/// One (asset, date) unit of work. Immutable; a retry is a new attempt of
/// the same task, not a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub asset_id: String,
    pub date: NaiveDate,
}

/// Terminal failure of a single task. Rate-limit rejections never surface
/// here unless the configured retry cap was exhausted.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("remote returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("gave up after {0} rate-limit rejections")]
    RetriesExhausted(u32),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("cancelled before completion")]
    Cancelled,
}

#[derive(Debug)]
pub struct TaskFailure {
    pub task: FetchTask,
    pub error: TaskError,
}

/// Outcome of a bulk run. Partial failure is reported here, never raised:
/// `failures` lists every task that reached a terminal error while the rest
/// of the batch completed.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
}

impl BulkReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Expands a (date range x asset set) request into per-day fetch tasks and
/// drives them through a bounded worker pool under the global rate limiter.
#[derive(Clone)]
pub struct BulkProcessor {
    source: Arc<dyn HistorySource>,
    store: Arc<dyn SnapshotStore>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    concurrent_requests: usize,
}

impl BulkProcessor {
    pub fn new(
        source: Arc<dyn HistorySource>,
        store: Arc<dyn SnapshotStore>,
        settings: &crate::config::FetcherSettings,
    ) -> Self {
        Self::with_components(
            source,
            store,
            Arc::new(RateLimiter::new(settings.requests_per_minute)),
            RetryPolicy::from_settings(settings),
            settings.concurrent_requests,
        )
    }

    pub fn with_components(
        source: Arc<dyn HistorySource>,
        store: Arc<dyn SnapshotStore>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        concurrent_requests: usize,
    ) -> Self {
        Self {
            source,
            store,
            rate_limiter,
            retry,
            concurrent_requests: concurrent_requests.max(1),
        }
    }

    /// Fetch and persist every (asset, date) pair in `[start, end]`.
    ///
    /// Errors only for configuration-level problems (inverted date range);
    /// per-task failures land in the report. Completes once every enumerated
    /// task is terminal. Cancelling the token stops tasks that have not
    /// started yet; in-flight attempts run to completion.
    pub async fn run(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        assets: &[String],
        cancel: CancellationToken,
    ) -> Result<BulkReport> {
        if start > end {
            anyhow::bail!("Invalid date range: {} is after {}", start, end);
        }

        let tasks = enumerate_tasks(start, end, assets);
        info!(
            "Bulk fetch: {} tasks ({} to {}, {} assets)",
            tasks.len(),
            start,
            end,
            assets.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrent_requests));
        let mut queued = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let processor = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let worker_task = task.clone();

            queued.push(task);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore closed");

                if cancel.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }

                processor.execute(&worker_task, &cancel).await
            }));
        }

        let mut report = BulkReport {
            total: queued.len(),
            ..BulkReport::default()
        };

        let joined = futures::future::join_all(handles).await;
        for (task, result) in queued.into_iter().zip(joined) {
            match result {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(error)) => {
                    warn!("Task failed for {} on {}: {}", task.asset_id, task.date, error);
                    report.failures.push(TaskFailure { task, error });
                },
                Err(e) => {
                    // A worker panicked; report it against its task instead
                    // of aborting the batch.
                    report.failures.push(TaskFailure {
                        task,
                        error: TaskError::Transport(format!("worker aborted: {}", e)),
                    });
                },
            }
        }

        info!(
            "Bulk fetch finished: {}/{} succeeded, {} failed",
            report.succeeded,
            report.total,
            report.failures.len()
        );

        Ok(report)
    }

    /// Single-task entry point. Skips enumeration and the worker pool but
    /// still passes the rate limiter and retry policy.
    pub async fn fetch_one(&self, asset_id: &str, date: NaiveDate) -> Result<(), TaskError> {
        let task = FetchTask {
            asset_id: asset_id.to_string(),
            date,
        };
        self.execute(&task, &CancellationToken::new()).await
    }

    /// One task from first attempt to terminal state. Rate-limit rejections
    /// loop back through the full dispatch path (limiter included) after the
    /// backoff; everything else terminates the task.
    async fn execute(&self, task: &FetchTask, cancel: &CancellationToken) -> Result<(), TaskError> {
        let mut rejections = 0u32;

        loop {
            self.rate_limiter.acquire().await;

            match self.source.fetch(&task.asset_id, task.date).await {
                FetchOutcome::Success(payload) => {
                    let outcome = self
                        .store
                        .persist(&task.asset_id, task.date, payload)
                        .await?;
                    if outcome == PersistOutcome::AlreadyExists {
                        debug!(
                            "Duplicate snapshot for {} on {} suppressed",
                            task.asset_id, task.date
                        );
                    }
                    return Ok(());
                },
                FetchOutcome::RateLimited => {
                    rejections += 1;
                    match self.retry.on_rate_limited(rejections) {
                        RetryDecision::GiveUp => {
                            return Err(TaskError::RetriesExhausted(rejections));
                        },
                        RetryDecision::RetryAfter(backoff) => {
                            debug!(
                                "Rate limited for {} on {} (rejection {}), retrying in {:?}",
                                task.asset_id, task.date, rejections, backoff
                            );
                            tokio::time::sleep(backoff).await;
                        },
                    }
                },
                FetchOutcome::HttpError { status, body } => {
                    return Err(TaskError::Remote { status, body });
                },
                FetchOutcome::TransportError(message) => {
                    return Err(TaskError::Transport(message));
                },
            }

            // A task stuck behind the remote ceiling should not hold up
            // shutdown indefinitely.
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
        }
    }
}

/// Date-major, asset-minor: all assets for day one, then day two, and so on.
/// Order only shapes rate-limiter pacing; persistence is commutative.
fn enumerate_tasks(start: NaiveDate, end: NaiveDate, assets: &[String]) -> Vec<FetchTask> {
    let mut tasks = Vec::new();
    let mut date = start;

    while date <= end {
        for asset in assets {
            tasks.push(FetchTask {
                asset_id: asset.clone(),
                date,
            });
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    tasks
}
