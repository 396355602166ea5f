//! Repository for ledger event persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::SqliteConnection;
use rust_decimal::Decimal;

use patrimoine_core::assets::resolve_open_line;
use patrimoine_core::errors::{DatabaseError, Result};
use patrimoine_core::ledger::{
    BatchOutcome, EventKind, EventQuery, EventStatus, EventUpdateOp, GroupOutcome,
    IdempotencyKey, LedgerError, LedgerEvent, LedgerRepositoryTrait, LedgerWriteBatch,
    LineLinkOp, LinkTarget, NewLedgerEvent, DATA_ORIGIN, DATA_TR_UID, ORIGIN_AUTO_DCA,
    ORIGIN_AUTO_LOAN,
};

use super::model::{into_events, LedgerEventDB, NewLedgerEventDB};
use crate::assets::{load_portfolio_lines, set_current_value, upsert_lines};
use crate::catalog::upsert_products;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::ledger_events;
use crate::utils::{chunk_for_sqlite, parse_decimal};

diesel::define_sql_function! {
    /// SQLite JSON1 accessor used to reach into the event data bag.
    fn json_extract(json: Text, path: Text) -> Nullable<Text>;
}

fn json_path(key: &str) -> String {
    format!("$.{}", key)
}

pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn load_event(conn: &mut SqliteConnection, user_id: i64, event_id: i64) -> Result<LedgerEvent> {
    let row = ledger_events::table
        .filter(ledger_events::id.eq(event_id))
        .filter(ledger_events::user_id.eq(user_id))
        .select(LedgerEventDB::as_select())
        .first::<LedgerEventDB>(conn)
        .optional()
        .into_core()?;

    match row {
        Some(row) => row.try_into(),
        None => Err(LedgerError::NotFound(format!("Event {}", event_id)).into()),
    }
}

/// Event currently holding `key`, looked up on the given connection so that
/// rows inserted earlier in the same transaction are visible.
fn key_holder(conn: &mut SqliteConnection, key: &IdempotencyKey) -> Result<Option<LedgerEvent>> {
    let rows = match key {
        IdempotencyKey::AutoDca {
            asset_id,
            value_date,
        } => ledger_events::table
            .filter(ledger_events::asset_id.eq(*asset_id))
            .filter(ledger_events::value_date.eq(*value_date))
            .filter(json_extract(ledger_events::data, json_path(DATA_ORIGIN)).eq(ORIGIN_AUTO_DCA))
            .select(LedgerEventDB::as_select())
            .load::<LedgerEventDB>(conn),
        IdempotencyKey::AutoLoan { asset_id, .. } => ledger_events::table
            .filter(ledger_events::asset_id.eq(*asset_id))
            .filter(
                json_extract(ledger_events::data, json_path(DATA_ORIGIN)).eq(ORIGIN_AUTO_LOAN),
            )
            .select(LedgerEventDB::as_select())
            .load::<LedgerEventDB>(conn),
        IdempotencyKey::BrokerUid {
            user_id,
            asset_id,
            uid,
        } => ledger_events::table
            .filter(ledger_events::user_id.eq(*user_id))
            .filter(ledger_events::asset_id.eq(*asset_id))
            .filter(json_extract(ledger_events::data, json_path(DATA_TR_UID)).eq(uid.clone()))
            .select(LedgerEventDB::as_select())
            .load::<LedgerEventDB>(conn),
    }
    .into_core()?;

    // The SQL filter narrows candidates; the key derivation decides.
    Ok(into_events(rows)?
        .into_iter()
        .find(|e| IdempotencyKey::of_event(e).as_ref() == Some(key)))
}

fn insert_event(conn: &mut SqliteConnection, event: NewLedgerEvent) -> Result<LedgerEvent> {
    let row = NewLedgerEventDB::from_new(event, Utc::now().naive_utc());
    diesel::insert_into(ledger_events::table)
        .values(&row)
        .returning(LedgerEventDB::as_returning())
        .get_result::<LedgerEventDB>(conn)
        .into_core()?
        .try_into()
}

/// Applies one patch. Returns the stored event and whether it changed.
fn apply_update(conn: &mut SqliteConnection, op: &EventUpdateOp) -> Result<(LedgerEvent, bool)> {
    let mut event = load_event(conn, op.user_id, op.event_id)?;
    if !op.patch.apply_to(&mut event) {
        return Ok((event, false));
    }
    event.updated_at = Utc::now().naive_utc();

    diesel::update(ledger_events::table.find(event.id))
        .set(&LedgerEventDB::from(&event))
        .execute(conn)
        .into_core()?;

    Ok((event, true))
}

/// Attaches the target event to the open line for the op's ISIN. Returns
/// whether a row changed.
fn apply_link(
    conn: &mut SqliteConnection,
    op: &LineLinkOp,
    groups: &[GroupOutcome],
) -> Result<bool> {
    let event_id = match op.target {
        LinkTarget::Event(id) => id,
        LinkTarget::Group(idx) => match groups.get(idx) {
            Some(GroupOutcome::Inserted(ids)) => match ids.first() {
                Some(id) => *id,
                None => return Ok(false),
            },
            _ => return Ok(false),
        },
    };
    let lines = load_portfolio_lines(conn, op.asset_id)?;
    let Some(line) = resolve_open_line(&lines, &op.isin) else {
        return Ok(false);
    };

    let changed = diesel::update(
        ledger_events::table
            .filter(ledger_events::id.eq(event_id))
            .filter(ledger_events::asset_id.eq(op.asset_id))
            .filter(ledger_events::portfolio_line_id.is_null()),
    )
    .set((
        ledger_events::portfolio_line_id.eq(line.id),
        ledger_events::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)
    .into_core()?;
    Ok(changed > 0)
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    fn get_event(&self, user_id: i64, event_id: i64) -> Result<LedgerEvent> {
        let mut conn = get_connection(&self.pool)?;
        load_event(&mut conn, user_id, event_id)
    }

    fn query_events(&self, user_id: i64, query: &EventQuery) -> Result<Vec<LedgerEvent>> {
        let mut conn = get_connection(&self.pool)?;

        let mut sql = ledger_events::table
            .filter(ledger_events::user_id.eq(user_id))
            .select(LedgerEventDB::as_select())
            .into_boxed();

        if let Some(asset_id) = query.asset_id {
            sql = sql.filter(ledger_events::asset_id.eq(asset_id));
        }
        if let Some(kinds) = &query.kinds {
            let kinds: Vec<&'static str> = kinds.iter().map(|k| k.as_str()).collect();
            sql = sql.filter(ledger_events::kind.eq_any(kinds));
        }
        if let Some(statuses) = &query.statuses {
            let statuses: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
            sql = sql.filter(ledger_events::status.eq_any(statuses));
        }
        if let Some(from) = query.date_from {
            sql = sql.filter(ledger_events::value_date.ge(from));
        }
        if let Some(to) = query.date_to {
            sql = sql.filter(ledger_events::value_date.le(to));
        }
        if let Some(group) = &query.transfer_group_id {
            sql = sql.filter(ledger_events::transfer_group_id.eq(group.clone()));
        }
        if let Some(isin) = &query.isin {
            sql = sql.filter(ledger_events::isin.eq(isin.clone()));
        }

        let rows = sql
            .order((ledger_events::value_date.asc(), ledger_events::id.asc()))
            .load::<LedgerEventDB>(&mut conn)
            .into_core()?;

        into_events(rows)
    }

    fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEvent>> {
        let mut conn = get_connection(&self.pool)?;
        key_holder(&mut conn, key)
    }

    fn latest_by_origin(&self, asset_id: i64, origin: &str) -> Result<Option<LedgerEvent>> {
        let mut conn = get_connection(&self.pool)?;

        ledger_events::table
            .filter(ledger_events::asset_id.eq(asset_id))
            .filter(json_extract(ledger_events::data, json_path(DATA_ORIGIN)).eq(origin.to_string()))
            .order((ledger_events::value_date.desc(), ledger_events::id.desc()))
            .select(LedgerEventDB::as_select())
            .first::<LedgerEventDB>(&mut conn)
            .optional()
            .into_core()?
            .map(LedgerEvent::try_from)
            .transpose()
    }

    fn find_by_broker_uids(
        &self,
        user_id: i64,
        asset_id: i64,
        uids: &[String],
    ) -> Result<HashMap<String, LedgerEvent>> {
        let mut conn = get_connection(&self.pool)?;
        let mut found = HashMap::new();

        for chunk in chunk_for_sqlite(uids) {
            let rows = ledger_events::table
                .filter(ledger_events::user_id.eq(user_id))
                .filter(ledger_events::asset_id.eq(asset_id))
                .filter(
                    json_extract(ledger_events::data, json_path(DATA_TR_UID)).eq_any(chunk.to_vec()),
                )
                .select(LedgerEventDB::as_select())
                .load::<LedgerEventDB>(&mut conn)
                .into_core()?;

            for event in into_events(rows)? {
                if let Some(uid) = event.tr_uid() {
                    found.insert(uid.to_string(), event);
                }
            }
        }

        Ok(found)
    }

    fn sum_posted_amounts(
        &self,
        user_id: i64,
        asset_id: i64,
        kinds: &[EventKind],
        up_to: NaiveDate,
    ) -> Result<Decimal> {
        let mut conn = get_connection(&self.pool)?;
        let kinds: Vec<&'static str> = kinds.iter().map(|k| k.as_str()).collect();

        let amounts = ledger_events::table
            .filter(ledger_events::user_id.eq(user_id))
            .filter(ledger_events::asset_id.eq(asset_id))
            .filter(ledger_events::status.eq(EventStatus::Posted.as_str()))
            .filter(ledger_events::kind.eq_any(kinds))
            .filter(ledger_events::value_date.le(up_to))
            .filter(ledger_events::amount.is_not_null())
            .select(ledger_events::amount)
            .load::<Option<String>>(&mut conn)
            .into_core()?;

        // Amounts are TEXT; summing in SQL would go through floating point.
        amounts
            .iter()
            .flatten()
            .try_fold(Decimal::ZERO, |acc, raw| -> Result<Decimal> {
                Ok(acc + parse_decimal(raw, "amount")?)
            })
    }

    async fn create_events(&self, events: Vec<NewLedgerEvent>) -> Result<Vec<LedgerEvent>> {
        self.writer
            .exec(move |conn| {
                let mut created = Vec::with_capacity(events.len());
                for event in events {
                    if let Some(key) = IdempotencyKey::of_new(&event) {
                        if key_holder(conn, &key)?.is_some() {
                            return Err(DatabaseError::UniqueViolation(format!("{:?}", key)).into());
                        }
                    }
                    created.push(insert_event(conn, event)?);
                }
                Ok(created)
            })
            .await
    }

    async fn update_events(&self, updates: Vec<EventUpdateOp>) -> Result<Vec<LedgerEvent>> {
        self.writer
            .exec(move |conn| {
                updates
                    .iter()
                    .map(|op| apply_update(conn, op).map(|(event, _)| event))
                    .collect()
            })
            .await
    }

    async fn delete_events(&self, user_id: i64, event_ids: Vec<i64>) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                for id in &event_ids {
                    load_event(conn, user_id, *id)?;
                }
                let mut deleted = 0;
                for chunk in chunk_for_sqlite(&event_ids) {
                    deleted += diesel::delete(
                        ledger_events::table
                            .filter(ledger_events::user_id.eq(user_id))
                            .filter(ledger_events::id.eq_any(chunk.to_vec())),
                    )
                    .execute(conn)
                    .into_core()?;
                }
                Ok(deleted)
            })
            .await
    }

    async fn apply_batch(&self, batch: LedgerWriteBatch) -> Result<BatchOutcome> {
        self.writer
            .exec(move |conn| {
                let mut outcome = BatchOutcome::default();

                if let Some(positions) = batch.positions {
                    outcome.catalog = upsert_products(conn, positions.products)?;
                    outcome.lines_written = upsert_lines(conn, positions.lines)?;
                }

                for group in batch.groups {
                    let mut taken = None;
                    for key in group.iter().filter_map(IdempotencyKey::of_new) {
                        if let Some(holder) = key_holder(conn, &key)? {
                            taken = Some(holder.id);
                            break;
                        }
                    }
                    match taken {
                        Some(existing_id) => {
                            outcome.groups.push(GroupOutcome::Skipped { existing_id })
                        }
                        None => {
                            let mut ids = Vec::with_capacity(group.len());
                            for event in group {
                                ids.push(insert_event(conn, event)?.id);
                            }
                            outcome.groups.push(GroupOutcome::Inserted(ids));
                        }
                    }
                }

                for op in &batch.updates {
                    if apply_update(conn, op)?.1 {
                        outcome.updated += 1;
                    }
                }

                for op in &batch.links {
                    if apply_link(conn, op, &outcome.groups)? {
                        outcome.linked += 1;
                    }
                }

                if let Some(update) = batch.asset_value {
                    set_current_value(conn, update.asset_id, update.value)?;
                }

                Ok(outcome)
            })
            .await
    }
}
