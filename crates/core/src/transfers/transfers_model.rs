use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{EventData, EventStatus};

/// Request to move `amount` from one asset to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source_asset_id: i64,
    pub target_asset_id: i64,
    /// Strictly positive magnitude.
    pub amount: Decimal,
    pub value_date: NaiveDate,
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub rrule: Option<String>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub data: Option<EventData>,
}

impl NewTransfer {
    pub fn new(source_asset_id: i64, target_asset_id: i64, amount: Decimal, value_date: NaiveDate) -> Self {
        Self {
            source_asset_id,
            target_asset_id,
            amount,
            value_date,
            status: None,
            rrule: None,
            end_date: None,
            category: None,
            note: None,
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub debit_id: i64,
    pub credit_id: i64,
    pub group_id: String,
}
