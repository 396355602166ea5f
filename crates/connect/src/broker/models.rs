//! Models for broker payloads.
//!
//! The broker answers with loosely shaped JSON whose field names changed
//! between endpoints and over time (`netSize` vs `quantity`, `averageBuyIn`
//! vs `avgPrice.value`, positions flat or nested in categories). The raw
//! types below accept every known shape; [`BrokerPayload::normalize`] turns
//! them into the single internal shape used by reconciliation.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use patrimoine_core::catalog::{normalize_isin, PositionSnapshot};
use patrimoine_core::utils::time_utils::{date_from_epoch_millis, parse_value_date};

/// Answer to a login request: the broker sent a 2FA code to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectChallenge {
    pub process_id: String,
    #[serde(alias = "countdownInSeconds")]
    pub countdown_seconds: i64,
}

/// Everything one `fetch` returns, as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerPayload {
    #[serde(default)]
    pub cash: Option<Value>,
    /// Older answers carried the accounts under `positions`.
    #[serde(default, alias = "positions")]
    pub accounts: Vec<RawBrokerAccount>,
    #[serde(default)]
    pub transactions: Vec<Value>,
}

/// A sub-account (securities account) as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBrokerAccount {
    #[serde(default)]
    pub cash_account_number: Option<String>,
    #[serde(default)]
    pub securities_account_number: Option<String>,
    #[serde(default, alias = "product_type")]
    pub product_type: Option<String>,
    /// Either position objects or categories holding a `positions` array.
    #[serde(default)]
    pub positions: Vec<Value>,
}

/// A broker transaction after normalization. `raw` keeps the untouched record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerTransaction {
    /// Stable broker id, when the record has one.
    pub id: Option<String>,
    /// Lowercased event type (`order_executed`, `interest_payout`, ...).
    pub event_type: Option<String>,
    /// Timestamp exactly as sent, used for identity hashing.
    pub timestamp: Option<String>,
    pub value_date: Option<NaiveDate>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub isin: Option<String>,
    pub icon: Option<String>,
    pub raw: Value,
}

/// A sub-account after normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrokerAccountSnapshot {
    pub cash_account_number: Option<String>,
    pub securities_account_number: Option<String>,
    pub product_type: Option<String>,
    pub positions: Vec<PositionSnapshot>,
}

/// A full broker snapshot in the internal shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrokerPortfolio {
    pub cash: Option<Decimal>,
    pub accounts: Vec<BrokerAccountSnapshot>,
    pub transactions: Vec<BrokerTransaction>,
}

impl BrokerPayload {
    pub fn normalize(&self) -> BrokerPortfolio {
        BrokerPortfolio {
            cash: self.cash.as_ref().and_then(cash_amount),
            accounts: self.accounts.iter().map(RawBrokerAccount::normalize).collect(),
            transactions: self.transactions.iter().map(normalize_transaction).collect(),
        }
    }
}

impl RawBrokerAccount {
    pub fn normalize(&self) -> BrokerAccountSnapshot {
        BrokerAccountSnapshot {
            cash_account_number: self.cash_account_number.clone(),
            securities_account_number: self.securities_account_number.clone(),
            product_type: self.product_type.clone(),
            positions: normalize_positions(&self.positions),
        }
    }
}

/// Flattens positions that may be nested one level deep in categories.
pub fn normalize_positions(entries: &[Value]) -> Vec<PositionSnapshot> {
    let mut positions = Vec::new();
    for entry in entries {
        match entry.get("positions").and_then(Value::as_array) {
            Some(nested) => positions.extend(nested.iter().filter_map(normalize_position)),
            None => positions.extend(normalize_position(entry)),
        }
    }
    positions
}

/// Maps one position, whatever its shape. Non-objects are dropped.
pub fn normalize_position(value: &Value) -> Option<PositionSnapshot> {
    if !value.is_object() {
        return None;
    }
    let instrument = value.get("instrument");

    let isin = text_field(value, "isin")
        .or_else(|| instrument.and_then(|i| text_field(i, "isin")));
    let name = text_field(value, "name")
        .or_else(|| text_field(value, "title"))
        .or_else(|| instrument.and_then(|i| text_field(i, "title")));
    let units = first_decimal(value, &["netSize", "quantity", "units"]);
    let avg_price = first_decimal(value, &["averageBuyIn", "avgPrice"]);

    Some(PositionSnapshot {
        isin: normalize_isin(isin.as_deref()),
        name,
        units,
        avg_price,
    })
}

/// Maps one timeline record. Missing fields stay `None`.
pub fn normalize_transaction(value: &Value) -> BrokerTransaction {
    let timestamp_value = value.get("timestamp").or_else(|| value.get("date"));
    let timestamp = timestamp_value.and_then(scalar_text);
    let value_date = timestamp_value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().and_then(date_from_epoch_millis),
        Value::String(s) => parse_value_date(s),
        _ => None,
    });

    BrokerTransaction {
        id: text_field(value, "id"),
        event_type: text_field(value, "eventType")
            .or_else(|| text_field(value, "type"))
            .map(|t| t.trim().to_lowercase()),
        timestamp,
        value_date,
        title: text_field(value, "title").or_else(|| text_field(value, "name")),
        subtitle: text_field(value, "subtitle"),
        amount: value.get("amount").and_then(decimal_value),
        quantity: first_decimal(value, &["quantity", "shares", "numberOfShares"]),
        isin: normalize_isin(text_field(value, "isin").as_deref()),
        icon: text_field(value, "icon"),
        raw: value.clone(),
    }
}

/// Cash balance in any of the shapes the broker used: a number, a string,
/// `{value}`/`{amount}`, or a list of per-currency entries (first one wins).
pub fn cash_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Array(items) => items.iter().find_map(cash_amount),
        other => decimal_value(other),
    }
}

/// Reads a decimal from a number, a numeric string, or an object carrying
/// `value` or `amount`.
pub fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal_text(&n.to_string()),
        Value::String(s) => parse_decimal_text(s),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("amount"))
            .and_then(decimal_value),
        _ => None,
    }
}

fn parse_decimal_text(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn first_decimal(value: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(decimal_value))
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
