//! Database models for ledger events.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde_json::Value;

use patrimoine_core::errors::{DatabaseError, Error, Result};
use patrimoine_core::ledger::{EventData, LedgerEvent, NewLedgerEvent};

use crate::utils::{optional_decimal_to_text, parse_optional_decimal};

/// Database model for ledger events.
///
/// `None` fields are written as NULL so a patch can clear a column.
#[derive(Queryable, Identifiable, Selectable, AsChangeset, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::ledger_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct LedgerEventDB {
    pub id: i64,
    pub user_id: i64,
    pub asset_id: i64,
    pub target_asset_id: Option<i64>,
    pub kind: String,
    pub status: String,
    pub value_date: NaiveDate,
    pub rrule: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub amount: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub isin: Option<String>,
    pub portfolio_line_id: Option<i64>,
    pub transfer_group_id: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub data: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::ledger_events)]
pub struct NewLedgerEventDB {
    pub user_id: i64,
    pub asset_id: i64,
    pub target_asset_id: Option<i64>,
    pub kind: String,
    pub status: String,
    pub value_date: NaiveDate,
    pub rrule: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub amount: Option<String>,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub isin: Option<String>,
    pub portfolio_line_id: Option<i64>,
    pub transfer_group_id: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub data: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn data_to_text(data: &EventData) -> String {
    Value::Object(data.clone()).to_string()
}

fn data_from_text(raw: &str) -> Result<EventData> {
    if raw.trim().is_empty() {
        return Ok(EventData::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(EventData::new()),
        Ok(other) => Err(Error::Database(DatabaseError::Internal(format!(
            "Event data must be a JSON object, found {}",
            other
        )))),
        Err(e) => Err(Error::Database(DatabaseError::Internal(format!(
            "Event data is not valid JSON: {}",
            e
        )))),
    }
}

impl NewLedgerEventDB {
    pub fn from_new(event: NewLedgerEvent, now: NaiveDateTime) -> Self {
        Self {
            user_id: event.user_id,
            asset_id: event.asset_id,
            target_asset_id: event.target_asset_id,
            kind: event.kind.as_str().to_string(),
            status: event.status.as_str().to_string(),
            value_date: event.value_date,
            rrule: event.rrule,
            end_date: event.end_date,
            amount: optional_decimal_to_text(event.amount),
            quantity: optional_decimal_to_text(event.quantity),
            unit_price: optional_decimal_to_text(event.unit_price),
            isin: event.isin,
            portfolio_line_id: event.portfolio_line_id,
            transfer_group_id: event.transfer_group_id,
            category: event.category,
            note: event.note,
            data: data_to_text(&event.data),
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&LedgerEvent> for LedgerEventDB {
    fn from(event: &LedgerEvent) -> Self {
        Self {
            id: event.id,
            user_id: event.user_id,
            asset_id: event.asset_id,
            target_asset_id: event.target_asset_id,
            kind: event.kind.as_str().to_string(),
            status: event.status.as_str().to_string(),
            value_date: event.value_date,
            rrule: event.rrule.clone(),
            end_date: event.end_date,
            amount: optional_decimal_to_text(event.amount),
            quantity: optional_decimal_to_text(event.quantity),
            unit_price: optional_decimal_to_text(event.unit_price),
            isin: event.isin.clone(),
            portfolio_line_id: event.portfolio_line_id,
            transfer_group_id: event.transfer_group_id.clone(),
            category: event.category.clone(),
            note: event.note.clone(),
            data: data_to_text(&event.data),
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

impl TryFrom<LedgerEventDB> for LedgerEvent {
    type Error = Error;

    fn try_from(db: LedgerEventDB) -> Result<Self> {
        Ok(Self {
            id: db.id,
            user_id: db.user_id,
            asset_id: db.asset_id,
            target_asset_id: db.target_asset_id,
            kind: db.kind.parse()?,
            status: db.status.parse()?,
            value_date: db.value_date,
            rrule: db.rrule,
            end_date: db.end_date,
            amount: parse_optional_decimal(db.amount.as_deref(), "amount")?,
            quantity: parse_optional_decimal(db.quantity.as_deref(), "quantity")?,
            unit_price: parse_optional_decimal(db.unit_price.as_deref(), "unit_price")?,
            isin: db.isin,
            portfolio_line_id: db.portfolio_line_id,
            transfer_group_id: db.transfer_group_id,
            category: db.category,
            note: db.note,
            data: data_from_text(&db.data)?,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

/// Converts loaded rows, failing on the first corrupt one.
pub fn into_events(rows: Vec<LedgerEventDB>) -> Result<Vec<LedgerEvent>> {
    rows.into_iter().map(LedgerEvent::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_or_null_data_reads_as_empty_bag() {
        assert!(data_from_text("").unwrap().is_empty());
        assert!(data_from_text("null").unwrap().is_empty());
    }

    #[test]
    fn non_object_data_is_rejected() {
        assert!(data_from_text("[1,2]").is_err());
        assert!(data_from_text("{oops").is_err());
    }
}
