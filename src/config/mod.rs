mod config;

pub use config::{ApiSettings, CronSettings, FetcherSettings, PostgresSettings, Settings};
