use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalogued security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub isin: String,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A broker position after normalization, independent of the payload shape it came from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub isin: Option<String>,
    pub name: Option<String>,
    pub units: Option<Decimal>,
    pub avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogUpsertResult {
    pub created: usize,
    pub existing: usize,
}

/// Trimmed, uppercased ISIN; empty strings become `None`.
pub fn normalize_isin(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}
