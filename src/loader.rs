//! Imports previously downloaded snapshot files into the store.
//!
//! Files are named `{asset_id}_{YYYY-MM-DD}.json` and go through the same
//! persistence path as live fetches, so re-importing a directory is safe.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use log::{info, warn};
use serde_json::Value;

use crate::db::{PersistOutcome, SnapshotStore};

#[derive(Debug)]
pub struct LoadFailure {
    pub file: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    pub failures: Vec<LoadFailure>,
}

/// Splits `bitcoin_2024-03-01.json` into its asset id and date. The date is
/// taken from the last underscore so asset ids containing underscores still
/// parse.
pub fn parse_snapshot_filename(name: &str) -> Option<(String, NaiveDate)> {
    let stem = name.strip_suffix(".json")?;
    let (asset_id, date_str) = stem.rsplit_once('_')?;
    if asset_id.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
    Some((asset_id.to_string(), date))
}

/// Persists every recognizable JSON snapshot file in `dir`. Unreadable or
/// misnamed files are collected as failures, not fatal.
pub async fn load_directory(dir: &Path, store: &dyn SnapshotStore) -> anyhow::Result<LoadReport> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read snapshot directory {}", dir.display()))?;

    let mut report = LoadReport::default();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }

        let Some((asset_id, date)) = parse_snapshot_filename(name) else {
            report.failures.push(LoadFailure {
                file: path,
                reason: "filename is not {asset_id}_{YYYY-MM-DD}.json".to_string(),
            });
            continue;
        };

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                report.failures.push(LoadFailure {
                    file: path,
                    reason: format!("read failed: {}", e),
                });
                continue;
            },
        };

        let payload: Value = match serde_json::from_str(&contents) {
            Ok(payload) => payload,
            Err(e) => {
                report.failures.push(LoadFailure {
                    file: path,
                    reason: format!("invalid JSON: {}", e),
                });
                continue;
            },
        };

        match store.persist(&asset_id, date, payload).await {
            Ok(PersistOutcome::Inserted) => report.loaded += 1,
            Ok(PersistOutcome::AlreadyExists) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to persist {} from {}: {}", asset_id, name, e);
                report.failures.push(LoadFailure {
                    file: path,
                    reason: e.to_string(),
                });
            },
        }
    }

    info!(
        "Import finished: {} loaded, {} already present, {} failed",
        report.loaded,
        report.skipped,
        report.failures.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_payload, MemoryStore};

    #[test]
    fn parses_well_formed_filenames() {
        let (asset, date) = parse_snapshot_filename("bitcoin_2024-03-01.json").unwrap();
        assert_eq!(asset, "bitcoin");
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        // Underscore in the asset id.
        let (asset, _) = parse_snapshot_filename("wrapped_bitcoin_2024-03-01.json").unwrap();
        assert_eq!(asset, "wrapped_bitcoin");
    }

    #[test]
    fn rejects_malformed_filenames() {
        assert!(parse_snapshot_filename("bitcoin.json").is_none());
        assert!(parse_snapshot_filename("bitcoin_03-01-2024.json").is_none());
        assert!(parse_snapshot_filename("_2024-03-01.json").is_none());
        assert!(parse_snapshot_filename("bitcoin_2024-03-01.csv").is_none());
    }

    #[tokio::test]
    async fn imports_directory_and_reports_bad_files() {
        let dir = std::env::temp_dir().join(format!("coinvault-loader-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        tokio::fs::write(
            dir.join("bitcoin_2024-03-01.json"),
            sample_payload(100.0, 1.0).to_string(),
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join("ethereum_2024-03-01.json"), "{not json")
            .await
            .unwrap();
        tokio::fs::write(dir.join("notes.txt"), "ignored").await.unwrap();

        let store = MemoryStore::new();
        let report = load_directory(&dir, &store).await.unwrap();

        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.snapshot_count(), 1);

        // Re-import is a no-op.
        let report = load_directory(&dir, &store).await.unwrap();
        assert_eq!(report.loaded, 0);
        assert_eq!(report.skipped, 1);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
