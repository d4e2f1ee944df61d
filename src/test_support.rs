//! Shared test doubles: a scripted history source and an in-memory store
//! with the same idempotence and aggregate-widening semantics as the
//! PostgreSQL layer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};

use crate::db::models::{MonthlyAggregate, NewSnapshot};
use crate::db::{PersistError, PersistOutcome, SnapshotStore};
use crate::fetch::client::{FetchOutcome, HistorySource};

/// Minimal payload shaped like the remote history response.
pub fn sample_payload(price_usd: f64, volume_usd: f64) -> Value {
    json!({
        "market_data": {
            "current_price": { "usd": price_usd },
            "total_volume": { "usd": volume_usd }
        }
    })
}

type TaskKey = (String, NaiveDate);

/// Scripted [`HistorySource`]. Unscripted (asset, date) pairs succeed with a
/// fixed payload; scripted ones replay their queue, repeating the last entry
/// once drained.
pub struct MockSource {
    scripts: Mutex<HashMap<TaskKey, VecDeque<FetchOutcome>>>,
    attempts: Mutex<HashMap<TaskKey, u32>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_latency(Duration::ZERO)
    }

    /// Adds a per-call sleep so concurrency bounds are observable.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            latency,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, asset_id: &str, date: NaiveDate, outcomes: Vec<FetchOutcome>) {
        self.scripts
            .lock()
            .unwrap()
            .insert((asset_id.to_string(), date), outcomes.into());
    }

    pub fn attempts(&self, asset_id: &str, date: NaiveDate) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&(asset_id.to_string(), date))
            .copied()
            .unwrap_or(0)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for MockSource {
    async fn fetch(&self, asset_id: &str, date: NaiveDate) -> FetchOutcome {
        let key = (asset_id.to_string(), date);
        *self.attempts.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&key) {
            Some(queue) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    queue.front().cloned().unwrap_or(FetchOutcome::RateLimited)
                }
            },
            None => FetchOutcome::Success(sample_payload(1.0, 1.0)),
        }
    }
}

/// In-memory [`SnapshotStore`] mirroring the PostgreSQL semantics:
/// duplicate-key inserts are suppressed and monthly aggregates widen only
/// when a raw row was actually inserted.
pub struct MemoryStore {
    snapshots: Mutex<HashMap<TaskKey, NewSnapshot>>,
    aggregates: Mutex<HashMap<(String, i32, i32), MonthlyAggregate>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            aggregates: Mutex::new(HashMap::new()),
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn snapshot(&self, asset_id: &str, date: NaiveDate) -> Option<NewSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .get(&(asset_id.to_string(), date))
            .cloned()
    }

    pub fn aggregate(&self, asset_id: &str, year: i32, month: i32) -> Option<MonthlyAggregate> {
        self.aggregates
            .lock()
            .unwrap()
            .get(&(asset_id.to_string(), year, month))
            .cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn persist(
        &self,
        asset_id: &str,
        date: NaiveDate,
        payload: Value,
    ) -> Result<PersistOutcome, PersistError> {
        let snapshot = NewSnapshot::from_payload(asset_id, date, payload)?;

        let mut snapshots = self.snapshots.lock().unwrap();
        let key = (asset_id.to_string(), date);
        if snapshots.contains_key(&key) {
            return Ok(PersistOutcome::AlreadyExists);
        }

        let mut aggregates = self.aggregates.lock().unwrap();
        aggregates
            .entry((asset_id.to_string(), date.year(), date.month() as i32))
            .and_modify(|agg| agg.widen(snapshot.price_usd))
            .or_insert_with(|| {
                MonthlyAggregate::seed(
                    asset_id,
                    date.year(),
                    date.month() as i32,
                    snapshot.price_usd,
                )
            });

        snapshots.insert(key, snapshot);
        Ok(PersistOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn persisting_the_same_key_twice_keeps_one_row() {
        let store = MemoryStore::new();
        let d = date(2024, 3, 1);

        let first = store
            .persist("bitcoin", d, sample_payload(100.0, 1.0))
            .await
            .unwrap();
        let second = store
            .persist("bitcoin", d, sample_payload(200.0, 2.0))
            .await
            .unwrap();

        assert_eq!(first, PersistOutcome::Inserted);
        assert_eq!(second, PersistOutcome::AlreadyExists);
        assert_eq!(store.snapshot_count(), 1);
        assert_eq!(store.snapshot("bitcoin", d).unwrap().price_usd, 100.0);
        // The duplicate must not widen the aggregate either.
        let agg = store.aggregate("bitcoin", 2024, 3).unwrap();
        assert_eq!(agg.max_price, 100.0);
        assert_eq!(agg.min_price, 100.0);
    }

    #[tokio::test]
    async fn concurrent_persists_keep_aggregate_consistent() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let prices: Vec<f64> = (1..=28).map(|d| (d * 3 % 17) as f64 + 0.5).collect();

        let mut handles = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let store = store.clone();
            let price = *price;
            let d = date(2024, 3, (i + 1) as u32);
            handles.push(tokio::spawn(async move {
                store
                    .persist("cardano", d, sample_payload(price, 1.0))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let expected_max = prices.iter().cloned().fold(f64::MIN, f64::max);
        let expected_min = prices.iter().cloned().fold(f64::MAX, f64::min);
        let agg = store.aggregate("cardano", 2024, 3).unwrap();
        assert_eq!(agg.max_price, expected_max);
        assert_eq!(agg.min_price, expected_min);
        assert_eq!(store.snapshot_count(), prices.len());
    }
}
