use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ledger_constants::{DATA_ORIGIN, DATA_TR_UID};
use crate::assets::NewPortfolioLine;
use crate::catalog::{CatalogUpsertResult, PositionSnapshot};
use super::ledger_errors::LedgerError;

/// Open key/value bag attached to every event.
pub type EventData = serde_json::Map<String, Value>;

/// Closed classification of ledger events. Immutable once an event exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CashOp,
    Transfer,
    PortfolioTrade,
    Dividend,
    AllocationChange,
    LoanPrepayment,
    RentChange,
    ExpenseChange,
    ValuationAdjustment,
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::CashOp,
        EventKind::Transfer,
        EventKind::PortfolioTrade,
        EventKind::Dividend,
        EventKind::AllocationChange,
        EventKind::LoanPrepayment,
        EventKind::RentChange,
        EventKind::ExpenseChange,
        EventKind::ValuationAdjustment,
        EventKind::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::CashOp => "cash_op",
            EventKind::Transfer => "transfer",
            EventKind::PortfolioTrade => "portfolio_trade",
            EventKind::Dividend => "dividend",
            EventKind::AllocationChange => "allocation_change",
            EventKind::LoanPrepayment => "loan_prepayment",
            EventKind::RentChange => "rent_change",
            EventKind::ExpenseChange => "expense_change",
            EventKind::ValuationAdjustment => "valuation_adjustment",
            EventKind::Other => "other",
        }
    }

    /// Kinds that must reference a catalogued ISIN.
    pub const fn requires_known_isin(self) -> bool {
        matches!(self, EventKind::PortfolioTrade | EventKind::Dividend)
    }

    /// Kinds folded into the effective balance of a cash-like asset.
    pub const fn affects_cash_balance(self) -> bool {
        matches!(self, EventKind::CashOp | EventKind::Transfer)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| LedgerError::InvalidData(format!("Unknown event kind '{}'", s)))
    }
}

/// Lifecycle flag. Only `Posted` events count toward balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Planned,
    #[default]
    Posted,
    Cancelled,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventStatus::Planned => "planned",
            EventStatus::Posted => "posted",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "planned" => Ok(EventStatus::Planned),
            "posted" => Ok(EventStatus::Posted),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(LedgerError::InvalidData(format!(
                "Unknown event status '{}'",
                other
            ))),
        }
    }
}

/// A stored ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: i64,
    pub user_id: i64,
    pub asset_id: i64,
    pub target_asset_id: Option<i64>,
    pub kind: EventKind,
    pub status: EventStatus,
    pub value_date: NaiveDate,
    pub rrule: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub isin: Option<String>,
    pub portfolio_line_id: Option<i64>,
    pub transfer_group_id: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub data: EventData,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LedgerEvent {
    /// String value stored under `key` in the data bag.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn origin(&self) -> Option<&str> {
        self.data_str(DATA_ORIGIN)
    }

    pub fn tr_uid(&self) -> Option<&str> {
        self.data_str(DATA_TR_UID)
    }

    pub fn is_posted(&self) -> bool {
        self.status == EventStatus::Posted
    }
}

/// A validated event ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEvent {
    pub user_id: i64,
    pub asset_id: i64,
    pub target_asset_id: Option<i64>,
    pub kind: EventKind,
    pub status: EventStatus,
    pub value_date: NaiveDate,
    pub rrule: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub isin: Option<String>,
    pub portfolio_line_id: Option<i64>,
    pub transfer_group_id: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub data: EventData,
}

impl NewLedgerEvent {
    /// A posted event with every optional field empty.
    pub fn posted(user_id: i64, asset_id: i64, kind: EventKind, value_date: NaiveDate) -> Self {
        Self {
            user_id,
            asset_id,
            target_asset_id: None,
            kind,
            status: EventStatus::Posted,
            value_date,
            rrule: None,
            end_date: None,
            amount: None,
            quantity: None,
            unit_price: None,
            isin: None,
            portfolio_line_id: None,
            transfer_group_id: None,
            category: None,
            note: None,
            data: EventData::new(),
        }
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = data;
        self
    }

    /// Materializes the stored form, used by in-memory stores.
    pub fn into_event(self, id: i64, now: NaiveDateTime) -> LedgerEvent {
        LedgerEvent {
            id,
            user_id: self.user_id,
            asset_id: self.asset_id,
            target_asset_id: self.target_asset_id,
            kind: self.kind,
            status: self.status,
            value_date: self.value_date,
            rrule: self.rrule,
            end_date: self.end_date,
            amount: self.amount,
            quantity: self.quantity,
            unit_price: self.unit_price,
            isin: self.isin,
            portfolio_line_id: self.portfolio_line_id,
            transfer_group_id: self.transfer_group_id,
            category: self.category,
            note: self.note,
            data: self.data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Loosely typed create payload as received from API clients.
///
/// Validated into a [`NewLedgerEvent`] by the ledger service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEventInput {
    pub asset_id: i64,
    pub target_asset_id: Option<i64>,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub value_date: Option<String>,
    pub rrule: Option<String>,
    pub end_date: Option<String>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub isin: Option<String>,
    pub category: Option<String>,
    pub note: Option<String>,
    pub data: Option<EventData>,
}

/// Partial update of an event. `None` leaves a field untouched; for nullable
/// columns `Some(None)` clears the value. The kind cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEventUpdate {
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub rrule: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub amount: Option<Option<Decimal>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub quantity: Option<Option<Decimal>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub unit_price: Option<Option<Decimal>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub isin: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub portfolio_line_id: Option<Option<i64>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub note: Option<Option<String>>,
    #[serde(default)]
    pub data: Option<EventData>,
}

impl LedgerEventUpdate {
    pub fn is_empty(&self) -> bool {
        *self == LedgerEventUpdate::default()
    }

    /// Applies the present fields to `event`. Returns whether anything changed.
    pub fn apply_to(&self, event: &mut LedgerEvent) -> bool {
        let mut changed = false;

        fn set<T: PartialEq + Clone>(slot: &mut T, value: &Option<T>, changed: &mut bool) {
            if let Some(v) = value {
                if slot != v {
                    *slot = v.clone();
                    *changed = true;
                }
            }
        }

        set(&mut event.status, &self.status, &mut changed);
        set(&mut event.value_date, &self.value_date, &mut changed);
        set(&mut event.rrule, &self.rrule, &mut changed);
        set(&mut event.end_date, &self.end_date, &mut changed);
        set(&mut event.amount, &self.amount, &mut changed);
        set(&mut event.quantity, &self.quantity, &mut changed);
        set(&mut event.unit_price, &self.unit_price, &mut changed);
        set(&mut event.isin, &self.isin, &mut changed);
        set(&mut event.portfolio_line_id, &self.portfolio_line_id, &mut changed);
        set(&mut event.category, &self.category, &mut changed);
        set(&mut event.note, &self.note, &mut changed);
        set(&mut event.data, &self.data, &mut changed);

        changed
    }
}

/// Filters for listing events. Results are always ordered by `(value_date, id)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub asset_id: Option<i64>,
    pub kinds: Option<Vec<EventKind>>,
    pub statuses: Option<Vec<EventStatus>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub transfer_group_id: Option<String>,
    pub isin: Option<String>,
}

impl EventQuery {
    pub fn for_asset(asset_id: i64) -> Self {
        Self {
            asset_id: Some(asset_id),
            ..Default::default()
        }
    }

    pub fn for_transfer_group(group_id: impl Into<String>) -> Self {
        Self {
            transfer_group_id: Some(group_id.into()),
            ..Default::default()
        }
    }

    /// Whether `event` passes every filter (user scoping is handled by the caller).
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if self.asset_id.is_some_and(|a| a != event.asset_id) {
            return false;
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&event.status) {
                return false;
            }
        }
        if self.date_from.is_some_and(|d| event.value_date < d) {
            return false;
        }
        if self.date_to.is_some_and(|d| event.value_date > d) {
            return false;
        }
        if let Some(group) = &self.transfer_group_id {
            if event.transfer_group_id.as_deref() != Some(group.as_str()) {
                return false;
            }
        }
        if let Some(isin) = &self.isin {
            if event.isin.as_deref() != Some(isin.as_str()) {
                return false;
            }
        }
        true
    }
}

/// An update scoped to the owning user.
#[derive(Debug, Clone)]
pub struct EventUpdateOp {
    pub user_id: i64,
    pub event_id: i64,
    pub patch: LedgerEventUpdate,
}

/// Broker positions written ahead of the batch's events.
#[derive(Debug, Clone, Default)]
pub struct PositionsWrite {
    /// Catalog entries; the first name seen for an ISIN wins.
    pub products: Vec<PositionSnapshot>,
    /// Upserted on `(asset_id, isin)`.
    pub lines: Vec<NewPortfolioLine>,
}

/// Event a [`LineLinkOp`] attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTarget {
    /// First event of the insert group at this index. Skipped groups are ignored.
    Group(usize),
    Event(i64),
}

/// Attaches an event to the open portfolio line holding `isin`, resolved
/// after the batch's lines are written. Events already attached keep their line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineLinkOp {
    pub target: LinkTarget,
    pub asset_id: i64,
    pub isin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetValueUpdate {
    pub asset_id: i64,
    pub value: Option<Decimal>,
}

/// Multi-row write committed as one unit.
///
/// Each insert group is all-or-nothing: when any member's idempotency key is
/// already taken, the whole group is skipped. A hard failure rolls back the
/// entire batch, positions and asset value included.
///
/// Applied in order: positions, insert groups, updates, line links, asset value.
#[derive(Debug, Clone, Default)]
pub struct LedgerWriteBatch {
    pub groups: Vec<Vec<NewLedgerEvent>>,
    pub updates: Vec<EventUpdateOp>,
    pub positions: Option<PositionsWrite>,
    pub links: Vec<LineLinkOp>,
    pub asset_value: Option<AssetValueUpdate>,
}

impl LedgerWriteBatch {
    /// Events only.
    pub fn events(groups: Vec<Vec<NewLedgerEvent>>, updates: Vec<EventUpdateOp>) -> Self {
        Self {
            groups,
            updates,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.updates.is_empty()
            && self.positions.is_none()
            && self.links.is_empty()
            && self.asset_value.is_none()
    }
}

/// Fate of one insert group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Inserted(Vec<i64>),
    /// An event with the same idempotency key already existed.
    Skipped { existing_id: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// One entry per group, in submission order.
    pub groups: Vec<GroupOutcome>,
    /// Updates that changed at least one field.
    pub updated: usize,
    pub catalog: CatalogUpsertResult,
    pub lines_written: usize,
    /// Link ops that attached an event.
    pub linked: usize,
}

impl BatchOutcome {
    pub fn inserted_events(&self) -> usize {
        self.groups
            .iter()
            .map(|g| match g {
                GroupOutcome::Inserted(ids) => ids.len(),
                GroupOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g, GroupOutcome::Skipped { .. }))
            .count()
    }
}
