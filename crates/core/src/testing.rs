//! In-memory implementations of the repository traits.
//!
//! Compiled for unit tests and behind the `test-utils` feature so dependent
//! crates can exercise services without a database. They honour the same
//! contracts as the SQLite repositories: user scoping, `(value_date, id)`
//! ordering, idempotency keys and all-or-nothing multi-row writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use crate::assets::{
    resolve_open_line, Asset, AssetKind, AssetRepositoryTrait, Loan, NewAsset, NewLoan,
    NewPortfolioLine, PortfolioLine, RecurringDeposit,
};
use crate::brokers::{BrokerLink, BrokerLinkRepositoryTrait, NewBrokerLink};
use crate::catalog::{CatalogUpsertResult, PositionSnapshot, Product, ProductCatalogTrait};
use crate::errors::{DatabaseError, Error, ExternalError, Result};
use crate::ledger::{
    BatchOutcome, EventKind, EventQuery, EventUpdateOp, GroupOutcome, IdempotencyKey, LedgerError,
    LedgerEvent, LedgerRepositoryTrait, LedgerWriteBatch, LinkTarget, NewLedgerEvent,
};
use crate::schedules::{JobRun, JobRunRepositoryTrait};
use crate::secrets::SecretCipher;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

// --- Ledger ---

#[derive(Debug, Clone, Default)]
struct LedgerState {
    events: Vec<LedgerEvent>,
    next_id: i64,
}

impl LedgerState {
    fn key_holder(&self, key: &IdempotencyKey) -> Option<i64> {
        self.events
            .iter()
            .find(|e| IdempotencyKey::of_event(e).as_ref() == Some(key))
            .map(|e| e.id)
    }

    fn insert(&mut self, event: NewLedgerEvent) -> LedgerEvent {
        self.next_id += 1;
        let stored = event.into_event(self.next_id, now());
        self.events.push(stored.clone());
        stored
    }

    fn apply_update(&mut self, op: &EventUpdateOp) -> Result<(LedgerEvent, bool)> {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == op.event_id && e.user_id == op.user_id)
            .ok_or_else(|| LedgerError::NotFound(format!("Event {}", op.event_id)))?;
        let changed = op.patch.apply_to(event);
        if changed {
            event.updated_at = now();
        }
        Ok((event.clone(), changed))
    }
}

/// Ledger store backed by a vector.
///
/// Batches carrying positions, line links or an asset value need the asset
/// and catalog stores attached with [`InMemoryLedgerRepository::with_positions`].
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    state: Mutex<LedgerState>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    positions: Option<(Arc<InMemoryAssetRepository>, Arc<InMemoryCatalog>)>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger whose batches also write into the given asset and catalog stores.
    pub fn with_positions(
        assets: Arc<InMemoryAssetRepository>,
        catalog: Arc<InMemoryCatalog>,
    ) -> Self {
        Self {
            positions: Some((assets, catalog)),
            ..Self::default()
        }
    }

    /// Makes aggregate reads (`sum_posted_amounts`) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail without touching the stored events.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every stored event, in insertion order.
    pub fn all_events(&self) -> Vec<LedgerEvent> {
        lock(&self.state).events.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::TransactionFailed("database is locked".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    fn get_event(&self, user_id: i64, event_id: i64) -> Result<LedgerEvent> {
        lock(&self.state)
            .events
            .iter()
            .find(|e| e.id == event_id && e.user_id == user_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("Event {}", event_id)).into())
    }

    fn query_events(&self, user_id: i64, query: &EventQuery) -> Result<Vec<LedgerEvent>> {
        let mut events: Vec<LedgerEvent> = lock(&self.state)
            .events
            .iter()
            .filter(|e| e.user_id == user_id && query.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| (a.value_date, a.id).cmp(&(b.value_date, b.id)));
        Ok(events)
    }

    fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<LedgerEvent>> {
        let state = lock(&self.state);
        Ok(state
            .key_holder(key)
            .and_then(|id| state.events.iter().find(|e| e.id == id).cloned()))
    }

    fn latest_by_origin(&self, asset_id: i64, origin: &str) -> Result<Option<LedgerEvent>> {
        Ok(lock(&self.state)
            .events
            .iter()
            .filter(|e| e.asset_id == asset_id && e.origin() == Some(origin))
            .max_by_key(|e| (e.value_date, e.id))
            .cloned())
    }

    fn find_by_broker_uids(
        &self,
        user_id: i64,
        asset_id: i64,
        uids: &[String],
    ) -> Result<HashMap<String, LedgerEvent>> {
        Ok(lock(&self.state)
            .events
            .iter()
            .filter(|e| e.user_id == user_id && e.asset_id == asset_id)
            .filter_map(|e| {
                let uid = e.tr_uid()?;
                uids.iter()
                    .any(|u| u == uid)
                    .then(|| (uid.to_string(), e.clone()))
            })
            .collect())
    }

    fn sum_posted_amounts(
        &self,
        user_id: i64,
        asset_id: i64,
        kinds: &[EventKind],
        up_to: NaiveDate,
    ) -> Result<Decimal> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("no such table: ledger_events".to_string()).into());
        }
        Ok(lock(&self.state)
            .events
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.asset_id == asset_id
                    && e.is_posted()
                    && kinds.contains(&e.kind)
                    && e.value_date <= up_to
            })
            .filter_map(|e| e.amount)
            .sum())
    }

    async fn create_events(&self, events: Vec<NewLedgerEvent>) -> Result<Vec<LedgerEvent>> {
        self.check_writable()?;
        let mut guard = lock(&self.state);
        let mut draft = guard.clone();
        let mut created = Vec::with_capacity(events.len());
        for event in events {
            if let Some(key) = IdempotencyKey::of_new(&event) {
                if draft.key_holder(&key).is_some() {
                    return Err(DatabaseError::UniqueViolation(format!("{:?}", key)).into());
                }
            }
            created.push(draft.insert(event));
        }
        *guard = draft;
        Ok(created)
    }

    async fn update_events(&self, updates: Vec<EventUpdateOp>) -> Result<Vec<LedgerEvent>> {
        self.check_writable()?;
        let mut guard = lock(&self.state);
        let mut draft = guard.clone();
        let mut updated = Vec::with_capacity(updates.len());
        for op in &updates {
            updated.push(draft.apply_update(op)?.0);
        }
        *guard = draft;
        Ok(updated)
    }

    async fn delete_events(&self, user_id: i64, event_ids: Vec<i64>) -> Result<usize> {
        self.check_writable()?;
        let mut guard = lock(&self.state);
        for id in &event_ids {
            if !guard
                .events
                .iter()
                .any(|e| e.id == *id && e.user_id == user_id)
            {
                return Err(LedgerError::NotFound(format!("Event {}", id)).into());
            }
        }
        let before = guard.events.len();
        guard
            .events
            .retain(|e| !(e.user_id == user_id && event_ids.contains(&e.id)));
        Ok(before - guard.events.len())
    }

    async fn apply_batch(&self, batch: LedgerWriteBatch) -> Result<BatchOutcome> {
        self.check_writable()?;
        let needs_positions =
            batch.positions.is_some() || !batch.links.is_empty() || batch.asset_value.is_some();
        let attached = match (&self.positions, needs_positions) {
            (Some(stores), true) => Some(stores),
            (None, true) => {
                return Err(Error::Unexpected(
                    "batch writes positions but no asset store is attached".to_string(),
                ))
            }
            (_, false) => None,
        };
        if let (Some((assets, _)), Some(update)) = (attached, &batch.asset_value) {
            assets.get_asset(update.asset_id)?;
        }

        let mut guard = lock(&self.state);
        let mut draft = guard.clone();
        let mut outcome = BatchOutcome::default();

        for group in batch.groups {
            let taken = group
                .iter()
                .filter_map(IdempotencyKey::of_new)
                .find_map(|key| draft.key_holder(&key));
            match taken {
                Some(existing_id) => outcome.groups.push(GroupOutcome::Skipped { existing_id }),
                None => {
                    let ids = group.into_iter().map(|e| draft.insert(e).id).collect();
                    outcome.groups.push(GroupOutcome::Inserted(ids));
                }
            }
        }
        for op in &batch.updates {
            if draft.apply_update(op)?.1 {
                outcome.updated += 1;
            }
        }

        // The asset was checked above; nothing below fails.
        if let Some((assets, catalog)) = attached {
            if let Some(positions) = batch.positions {
                outcome.catalog = catalog.upsert_products(positions.products);
                outcome.lines_written = assets.upsert_lines(positions.lines);
            }
            for op in &batch.links {
                let event_id = match op.target {
                    LinkTarget::Event(id) => Some(id),
                    LinkTarget::Group(idx) => match outcome.groups.get(idx) {
                        Some(GroupOutcome::Inserted(ids)) => ids.first().copied(),
                        _ => None,
                    },
                };
                let lines = assets.lines_of(op.asset_id);
                let (Some(event_id), Some(line)) = (event_id, resolve_open_line(&lines, &op.isin))
                else {
                    continue;
                };
                if let Some(event) = draft.events.iter_mut().find(|e| {
                    e.id == event_id && e.asset_id == op.asset_id && e.portfolio_line_id.is_none()
                }) {
                    event.portfolio_line_id = Some(line.id);
                    event.updated_at = now();
                    outcome.linked += 1;
                }
            }
            if let Some(update) = batch.asset_value {
                assets.set_value(update.asset_id, update.value)?;
            }
        }

        *guard = draft;
        Ok(outcome)
    }
}

// --- Assets ---

#[derive(Debug, Default)]
struct AssetState {
    assets: Vec<Asset>,
    deposits: Vec<RecurringDeposit>,
    loans: Vec<Loan>,
    lines: Vec<PortfolioLine>,
    next_id: i64,
}

impl AssetState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryAssetRepository {
    state: Mutex<AssetState>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an asset created at midnight of `created`.
    pub fn add_asset(
        &self,
        user_id: i64,
        kind: AssetKind,
        label: &str,
        current_value: Option<Decimal>,
        created: NaiveDate,
    ) -> Asset {
        let mut state = lock(&self.state);
        let asset = Asset {
            id: state.next(),
            user_id,
            kind,
            label: label.to_string(),
            current_value,
            created_at: created.and_hms_opt(0, 0, 0).unwrap_or_default(),
        };
        state.assets.push(asset.clone());
        asset
    }

    pub fn add_deposit(&self, deposit: RecurringDeposit) {
        let mut state = lock(&self.state);
        state.deposits.retain(|d| d.asset_id != deposit.asset_id);
        state.deposits.push(deposit);
    }

    pub fn add_loan(&self, new_loan: NewLoan) -> Loan {
        let mut state = lock(&self.state);
        let loan = Loan {
            id: state.next(),
            asset_id: new_loan.asset_id,
            principal: new_loan.principal,
            annual_rate: new_loan.annual_rate,
            duration_months: new_loan.duration_months,
            start_date: new_loan.start_date,
            monthly_payment: new_loan.monthly_payment,
            pay_from_asset_id: new_loan.pay_from_asset_id,
        };
        state.loans.push(loan.clone());
        loan
    }

    fn lines_of(&self, asset_id: i64) -> Vec<PortfolioLine> {
        lock(&self.state)
            .lines
            .iter()
            .filter(|l| l.asset_id == asset_id)
            .cloned()
            .collect()
    }

    fn set_value(&self, asset_id: i64, value: Option<Decimal>) -> Result<Asset> {
        let mut state = lock(&self.state);
        let asset = state
            .assets
            .iter_mut()
            .find(|a| a.id == asset_id)
            .ok_or_else(|| Error::NotFound(format!("Asset {} not found", asset_id)))?;
        asset.current_value = value;
        Ok(asset.clone())
    }

    fn upsert_lines(&self, lines: Vec<NewPortfolioLine>) -> usize {
        let mut state = lock(&self.state);
        let mut written = 0;
        for line in lines {
            let existing = state
                .lines
                .iter()
                .position(|l| l.asset_id == line.asset_id && l.isin == line.isin);
            match existing {
                Some(idx) => {
                    let current = &mut state.lines[idx];
                    current.label = line.label;
                    current.units = line.units;
                    current.avg_price = line.avg_price;
                    current.product_type = line.product_type;
                }
                None => {
                    let id = state.next();
                    state.lines.push(PortfolioLine {
                        id,
                        asset_id: line.asset_id,
                        isin: line.isin,
                        label: line.label,
                        units: line.units,
                        avg_price: line.avg_price,
                        product_type: line.product_type,
                    });
                }
            }
            written += 1;
        }
        written
    }
}

#[async_trait]
impl AssetRepositoryTrait for InMemoryAssetRepository {
    fn get_asset(&self, asset_id: i64) -> Result<Asset> {
        lock(&self.state)
            .assets
            .iter()
            .find(|a| a.id == asset_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Asset {} not found", asset_id)))
    }

    fn list_assets(&self, user_id: i64) -> Result<Vec<Asset>> {
        Ok(lock(&self.state)
            .assets
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    fn list_recurring_deposits(&self) -> Result<Vec<(Asset, RecurringDeposit)>> {
        let state = lock(&self.state);
        Ok(state
            .deposits
            .iter()
            .filter(|d| d.amount > Decimal::ZERO)
            .filter_map(|d| {
                let asset = state.assets.iter().find(|a| a.id == d.asset_id)?;
                Some((asset.clone(), d.clone()))
            })
            .collect())
    }

    fn list_loans(&self) -> Result<Vec<(Asset, Loan)>> {
        let state = lock(&self.state);
        Ok(state
            .loans
            .iter()
            .filter(|l| l.duration_months > 0)
            .filter_map(|l| {
                let asset = state.assets.iter().find(|a| a.id == l.asset_id)?;
                Some((asset.clone(), l.clone()))
            })
            .collect())
    }

    fn list_portfolio_lines(&self, asset_id: i64) -> Result<Vec<PortfolioLine>> {
        Ok(self.lines_of(asset_id))
    }

    async fn create_asset(&self, new_asset: NewAsset) -> Result<Asset> {
        let created = new_asset.created_at.unwrap_or_else(now);
        let asset = self.add_asset(
            new_asset.user_id,
            new_asset.kind,
            &new_asset.label,
            new_asset.current_value,
            created.date(),
        );
        let mut state = lock(&self.state);
        let stored = state
            .assets
            .iter_mut()
            .find(|a| a.id == asset.id)
            .ok_or_else(|| Error::Unexpected("asset vanished".to_string()))?;
        stored.created_at = created;
        Ok(stored.clone())
    }

    async fn set_recurring_deposit(&self, deposit: RecurringDeposit) -> Result<RecurringDeposit> {
        self.add_deposit(deposit.clone());
        Ok(deposit)
    }

    async fn create_loan(&self, new_loan: NewLoan) -> Result<Loan> {
        Ok(self.add_loan(new_loan))
    }

    async fn update_current_value(&self, asset_id: i64, value: Option<Decimal>) -> Result<Asset> {
        self.set_value(asset_id, value)
    }

    async fn upsert_portfolio_lines(&self, lines: Vec<NewPortfolioLine>) -> Result<usize> {
        Ok(self.upsert_lines(lines))
    }
}

// --- Catalog ---

#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<String, Product>>,
}

impl InMemoryCatalog {
    pub fn with_isins(isins: &[&str]) -> Self {
        let catalog = Self::default();
        {
            let mut products = lock(&catalog.products);
            for isin in isins {
                products.insert(
                    isin.to_string(),
                    Product {
                        isin: isin.to_string(),
                        name: None,
                        created_at: now(),
                    },
                );
            }
        }
        catalog
    }

    pub fn len(&self) -> usize {
        lock(&self.products).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upsert_products(&self, positions: Vec<PositionSnapshot>) -> CatalogUpsertResult {
        let mut products = lock(&self.products);
        let mut result = CatalogUpsertResult::default();
        for position in positions {
            let Some(isin) = position.isin else { continue };
            if products.contains_key(&isin) {
                result.existing += 1;
                continue;
            }
            products.insert(
                isin.clone(),
                Product {
                    isin,
                    name: position.name,
                    created_at: now(),
                },
            );
            result.created += 1;
        }
        result
    }
}

#[async_trait]
impl ProductCatalogTrait for InMemoryCatalog {
    fn is_known(&self, isin: &str) -> Result<bool> {
        Ok(lock(&self.products).contains_key(isin))
    }

    async fn upsert_from_positions(
        &self,
        positions: Vec<PositionSnapshot>,
    ) -> Result<CatalogUpsertResult> {
        Ok(self.upsert_products(positions))
    }
}

// --- Job runs ---

#[derive(Default)]
pub struct InMemoryJobRunRepository {
    runs: Mutex<Vec<JobRun>>,
}

impl InMemoryJobRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_runs(&self) -> Vec<JobRun> {
        lock(&self.runs).clone()
    }
}

#[async_trait]
impl JobRunRepositoryTrait for InMemoryJobRunRepository {
    async fn create(&self, mut run: JobRun) -> Result<JobRun> {
        let mut runs = lock(&self.runs);
        run.id = runs.len() as i64 + 1;
        runs.push(run.clone());
        Ok(run)
    }

    async fn update(&self, run: JobRun) -> Result<JobRun> {
        let mut runs = lock(&self.runs);
        let slot = runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Job run {}", run.id)))?;
        *slot = run.clone();
        Ok(run)
    }

    fn list_for_date(&self, job_name: &str, run_date: NaiveDate) -> Result<Vec<JobRun>> {
        Ok(lock(&self.runs)
            .iter()
            .filter(|r| r.job_name == job_name && r.run_date == run_date)
            .cloned()
            .collect())
    }

    fn list_recent(&self, job_name: &str, limit: i64) -> Result<Vec<JobRun>> {
        Ok(lock(&self.runs)
            .iter()
            .rev()
            .filter(|r| r.job_name == job_name)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// --- Broker links ---

#[derive(Default)]
pub struct InMemoryBrokerLinkRepository {
    links: Mutex<Vec<BrokerLink>>,
}

impl InMemoryBrokerLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerLinkRepositoryTrait for InMemoryBrokerLinkRepository {
    fn get_link(&self, user_id: i64, broker: &str) -> Result<Option<BrokerLink>> {
        Ok(lock(&self.links)
            .iter()
            .find(|l| l.user_id == user_id && l.broker == broker)
            .cloned())
    }

    async fn upsert_link(&self, link: NewBrokerLink) -> Result<BrokerLink> {
        let mut links = lock(&self.links);
        let ts = now();
        if let Some(existing) = links
            .iter_mut()
            .find(|l| l.user_id == link.user_id && l.broker == link.broker)
        {
            existing.phone = link.phone;
            existing.pin_enc = link.pin_enc;
            existing.remember_pin = link.remember_pin;
            existing.updated_at = ts;
            return Ok(existing.clone());
        }
        let stored = BrokerLink {
            id: links.len() as i64 + 1,
            user_id: link.user_id,
            broker: link.broker,
            phone: link.phone,
            pin_enc: link.pin_enc,
            remember_pin: link.remember_pin,
            created_at: ts,
            updated_at: ts,
        };
        links.push(stored.clone());
        Ok(stored)
    }

    async fn delete_link(&self, user_id: i64, broker: &str) -> Result<bool> {
        let mut links = lock(&self.links);
        let before = links.len();
        links.retain(|l| !(l.user_id == user_id && l.broker == broker));
        Ok(links.len() != before)
    }
}

// --- Secrets ---

/// Reversible stand-in for the real cipher: tokens are the reversed plaintext
/// behind a fixed prefix. Anything else fails to decrypt.
#[derive(Default)]
pub struct ReversingCipher;

const REVERSING_PREFIX: &str = "rev:";

impl SecretCipher for ReversingCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(format!(
            "{}{}",
            REVERSING_PREFIX,
            plaintext.chars().rev().collect::<String>()
        ))
    }

    fn decrypt(&self, token: &str) -> Result<String> {
        token
            .strip_prefix(REVERSING_PREFIX)
            .map(|body| body.chars().rev().collect())
            .ok_or_else(|| ExternalError::Decrypt("token was not produced by this cipher".into()).into())
    }
}
