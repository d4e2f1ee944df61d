pub mod client;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;

pub use client::{FetchOutcome, HistorySource, HttpHistorySource};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{BulkProcessor, BulkReport, FetchTask, TaskError, TaskFailure};
