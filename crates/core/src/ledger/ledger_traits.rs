use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::idempotency::IdempotencyKey;
use super::ledger_model::*;
use crate::errors::Result;

/// Trait defining the contract for ledger event storage.
///
/// Every read and write is scoped by `user_id`: an event owned by another
/// user behaves exactly like a missing one. Multi-row writes are atomic.
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// Fails with `NotFound` when absent or owned by another user.
    fn get_event(&self, user_id: i64, event_id: i64) -> Result<LedgerEvent>;

    /// Events matching `query`, ordered by `(value_date asc, id asc)`.
    fn query_events(&self, user_id: i64, query: &EventQuery) -> Result<Vec<LedgerEvent>>;

    /// Event already holding `key`, whatever its status.
    fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEvent>>;

    /// Most recent event (by value date) of `asset_id` tagged with `origin`.
    fn latest_by_origin(&self, asset_id: i64, origin: &str) -> Result<Option<LedgerEvent>>;

    /// Imported events of the asset keyed by their broker identity.
    fn find_by_broker_uids(
        &self,
        user_id: i64,
        asset_id: i64,
        uids: &[String],
    ) -> Result<HashMap<String, LedgerEvent>>;

    /// Sum of `amount` over posted events of `kinds` on the asset dated on or before `up_to`.
    fn sum_posted_amounts(
        &self,
        user_id: i64,
        asset_id: i64,
        kinds: &[EventKind],
        up_to: NaiveDate,
    ) -> Result<Decimal>;

    /// Inserts all events or none. A taken idempotency key fails the whole call
    /// with `DatabaseError::UniqueViolation`.
    async fn create_events(&self, events: Vec<NewLedgerEvent>) -> Result<Vec<LedgerEvent>>;

    /// Applies every patch or none. Fails with `NotFound` if any target is missing.
    async fn update_events(&self, updates: Vec<EventUpdateOp>) -> Result<Vec<LedgerEvent>>;

    /// Deletes every listed event or none. Fails with `NotFound` if any target is missing.
    async fn delete_events(&self, user_id: i64, event_ids: Vec<i64>) -> Result<usize>;

    /// Commits a materializer or reconciliation run in one transaction, positions
    /// and asset value included.
    async fn apply_batch(&self, batch: LedgerWriteBatch) -> Result<BatchOutcome>;
}

/// Trait defining the contract for ledger event operations exposed to callers.
#[async_trait]
pub trait LedgerServiceTrait: Send + Sync {
    fn get_event(&self, user_id: i64, event_id: i64) -> Result<LedgerEvent>;
    fn list_events(&self, user_id: i64, query: &EventQuery) -> Result<Vec<LedgerEvent>>;
    async fn create_event(&self, user_id: i64, input: LedgerEventInput) -> Result<LedgerEvent>;
    /// With `cascade`, a patch on one half of a transfer is mirrored on its sibling.
    /// Returns every event that was written.
    async fn update_event(
        &self,
        user_id: i64,
        event_id: i64,
        patch: LedgerEventUpdate,
        cascade: bool,
    ) -> Result<Vec<LedgerEvent>>;
    /// With `cascade`, deleting one half of a transfer deletes both. Returns the number removed.
    async fn delete_event(&self, user_id: i64, event_id: i64, cascade: bool) -> Result<usize>;
}
