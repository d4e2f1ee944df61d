use chrono::NaiveDate;
use serde_json::Value;

use crate::db::PersistError;

/// One asset's price/volume observation for a single calendar date.
///
/// Keyed by (asset_id, date) and write-once: a later write for the same key
/// is suppressed, never applied as an update.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub asset_id: String,
    pub date: NaiveDate,
    pub price_usd: f64,
    pub volume_usd: f64,
    pub raw_json: Value,
}

impl NewSnapshot {
    /// Builds a snapshot from a raw API payload, extracting the USD price
    /// and volume from `market_data`.
    pub fn from_payload(
        asset_id: &str,
        date: NaiveDate,
        payload: Value,
    ) -> Result<Self, PersistError> {
        let price_usd =
            market_data_usd(&payload, "current_price").ok_or(PersistError::MalformedPayload)?;
        let volume_usd =
            market_data_usd(&payload, "total_volume").ok_or(PersistError::MalformedPayload)?;

        Ok(Self {
            asset_id: asset_id.to_string(),
            date,
            price_usd,
            volume_usd,
            raw_json: payload,
        })
    }
}

fn market_data_usd(payload: &Value, field: &str) -> Option<f64> {
    payload
        .get("market_data")?
        .get(field)?
        .get("usd")?
        .as_f64()
}
