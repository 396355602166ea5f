use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-time balance of one asset. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveBalance {
    pub asset_id: i64,
    pub label: String,
    pub as_of: NaiveDate,
    /// Stored `current_value` of the asset.
    pub baseline: Decimal,
    /// Sum of the posted cash movements folded in.
    pub movements: Decimal,
    pub effective: Decimal,
    /// Set when the movements could not be read and only the baseline is reported.
    pub degraded: bool,
}
