pub mod config;
pub mod cron;
pub mod db;
pub mod fetch;
pub mod loader;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Settings;
pub use cron::CronScheduler;
pub use db::{Database, PersistError, PersistOutcome, SnapshotStore};
pub use fetch::{
    BulkProcessor, BulkReport, FetchOutcome, FetchTask, HistorySource, HttpHistorySource,
    RateLimiter, RetryPolicy, TaskError, TaskFailure,
};
