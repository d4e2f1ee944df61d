/// Monthly min/max price summary for one asset.
///
/// Keyed by (asset_id, year, month); created on the first snapshot of the
/// month and widened by every later one. Widening is commutative, so the
/// aggregate is correct under any ingestion order.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAggregate {
    pub asset_id: String,
    pub year: i32,
    pub month: i32,
    pub max_price: f64,
    pub min_price: f64,
}

impl MonthlyAggregate {
    /// Aggregate as of the first snapshot of the month.
    pub fn seed(asset_id: &str, year: i32, month: i32, price_usd: f64) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            year,
            month,
            max_price: price_usd,
            min_price: price_usd,
        }
    }

    pub fn widen(&mut self, price_usd: f64) {
        self.max_price = self.max_price.max(price_usd);
        self.min_price = self.min_price.min(price_usd);
    }
}
