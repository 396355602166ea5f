//! Service reconciling broker snapshots into the ledger.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::transaction_identity;
use super::mapping::{self, MappedEvent};
use super::models::{BrokerPortfolio, BrokerTransaction};
use super::traits::ReconciliationServiceTrait;
use patrimoine_core::assets::{
    get_owned_asset, resolve_open_line, AssetRepositoryTrait, NewPortfolioLine, PortfolioLine,
};
use patrimoine_core::catalog::ProductCatalogTrait;
use patrimoine_core::errors::Result;
use patrimoine_core::ledger::{
    AssetValueUpdate, EventData, EventKind, EventUpdateOp, LedgerEvent, LedgerEventUpdate,
    LedgerRepositoryTrait, LedgerWriteBatch, LineLinkOp, LinkTarget, NewLedgerEvent,
    PositionsWrite, DATA_TR_RAW, DATA_TR_UID,
};

/// What a sync run may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Compute and list the changes without writing anything.
    pub dry_run: bool,
    pub apply_transactions: bool,
    /// Overwrite the asset's stored value with the broker cash balance.
    pub apply_cash_balance: bool,
    /// Upsert the product catalog and the asset's portfolio lines.
    pub apply_positions: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            apply_transactions: true,
            apply_cash_balance: false,
            apply_positions: false,
        }
    }
}

impl SyncOptions {
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewAction {
    Create,
    Update,
    Unchanged,
}

/// One line of a dry-run listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    pub identity: String,
    pub action: PreviewAction,
    pub kind: EventKind,
    pub value_date: NaiveDate,
    pub amount: Decimal,
    pub category: Option<String>,
    pub isin: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsReport {
    pub catalog_created: usize,
    pub catalog_existing: usize,
    pub lines_written: usize,
}

/// Aggregate counts of one run. In a dry run they describe what would happen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records dropped for a missing date or amount, or repeated within the run.
    pub skipped: usize,
    /// Events newly attached to an open portfolio line.
    pub linked: usize,
    pub cash_applied: Option<Decimal>,
    pub positions: Option<PositionsReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<PreviewItem>,
}

/// Transaction record that survived validation.
struct Candidate<'a> {
    identity: String,
    tx: &'a BrokerTransaction,
    mapped: MappedEvent,
    value_date: NaiveDate,
    amount: Decimal,
}

#[derive(Default)]
struct SyncPlan {
    inserts: Vec<NewLedgerEvent>,
    updates: Vec<EventUpdateOp>,
    links: Vec<LineLinkOp>,
    /// Existing events whose only change is the line link.
    link_only: usize,
    unchanged: usize,
    skipped: usize,
    preview: Vec<PreviewItem>,
}

/// Service for reconciling broker data with the ledger.
pub struct ReconciliationService {
    ledger: Arc<dyn LedgerRepositoryTrait>,
    assets: Arc<dyn AssetRepositoryTrait>,
    catalog: Arc<dyn ProductCatalogTrait>,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<dyn LedgerRepositoryTrait>,
        assets: Arc<dyn AssetRepositoryTrait>,
        catalog: Arc<dyn ProductCatalogTrait>,
    ) -> Self {
        Self {
            ledger,
            assets,
            catalog,
        }
    }

    fn positions_write(&self, asset_id: i64, portfolio: &BrokerPortfolio) -> PositionsWrite {
        let product_types =
            mapping::infer_account_product_types(&portfolio.accounts, &portfolio.transactions);
        let mut write = PositionsWrite::default();
        for (account, product_type) in portfolio.accounts.iter().zip(product_types) {
            for position in &account.positions {
                let Some(isin) = position.isin.clone() else {
                    debug!("Skipping broker position without ISIN");
                    continue;
                };
                write.products.push(position.clone());
                write.lines.push(NewPortfolioLine {
                    asset_id,
                    isin,
                    label: position.name.clone(),
                    units: position.units,
                    avg_price: position.avg_price,
                    product_type: Some(product_type.as_str().to_string()),
                });
            }
        }
        write
    }

    /// Catalog counts a write of `positions` would produce.
    fn preview_positions(&self, positions: &PositionsWrite) -> Result<PositionsReport> {
        let mut report = PositionsReport {
            lines_written: positions.lines.len(),
            ..Default::default()
        };
        let mut added = HashSet::new();
        for line in &positions.lines {
            if added.contains(&line.isin) || self.catalog.is_known(&line.isin)? {
                report.catalog_existing += 1;
            } else {
                added.insert(line.isin.clone());
                report.catalog_created += 1;
            }
        }
        Ok(report)
    }

    /// Sorts records into inserts, updates and line links. `lines` are the
    /// asset's lines as they will stand once the run's positions are written.
    fn plan(
        &self,
        user_id: i64,
        asset_id: i64,
        transactions: &[BrokerTransaction],
        lines: &[PortfolioLine],
    ) -> Result<SyncPlan> {
        let mut plan = SyncPlan::default();
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(transactions.len());

        for tx in transactions {
            let mapped = mapping::map_transaction(tx);
            let (Some(value_date), Some(amount)) = (mapped.value_date, mapped.amount) else {
                debug!(
                    "Skipping broker record without date or amount (id: {:?}, type: {:?})",
                    tx.id, tx.event_type
                );
                plan.skipped += 1;
                continue;
            };
            let identity = transaction_identity(tx);
            if !seen.insert(identity.clone()) {
                debug!("Skipping repeated broker record {}", identity);
                plan.skipped += 1;
                continue;
            }
            candidates.push(Candidate {
                identity,
                tx,
                mapped,
                value_date,
                amount,
            });
        }

        let uids: Vec<String> = candidates.iter().map(|c| c.identity.clone()).collect();
        let existing = self.ledger.find_by_broker_uids(user_id, asset_id, &uids)?;

        for candidate in candidates {
            let link_isin = candidate
                .mapped
                .isin
                .as_deref()
                .filter(|isin| resolve_open_line(lines, isin).is_some());
            let link = |target| {
                link_isin.map(|isin| LineLinkOp {
                    target,
                    asset_id,
                    isin: isin.to_string(),
                })
            };

            let action = match existing.get(&candidate.identity) {
                Some(event) => {
                    let patch = reconcile_patch(event, &candidate.mapped);
                    let link = link(LinkTarget::Event(event.id))
                        .filter(|_| event.portfolio_line_id.is_none());
                    if patch.is_empty() && link.is_none() {
                        plan.unchanged += 1;
                        PreviewAction::Unchanged
                    } else {
                        if patch.is_empty() {
                            plan.link_only += 1;
                        } else {
                            plan.updates.push(EventUpdateOp {
                                user_id,
                                event_id: event.id,
                                patch,
                            });
                        }
                        plan.links.extend(link);
                        PreviewAction::Update
                    }
                }
                None => {
                    plan.links
                        .extend(link(LinkTarget::Group(plan.inserts.len())));
                    plan.inserts.push(new_event(user_id, asset_id, &candidate));
                    PreviewAction::Create
                }
            };

            plan.preview.push(PreviewItem {
                identity: candidate.identity,
                action,
                kind: candidate.mapped.kind,
                value_date: candidate.value_date,
                amount: candidate.amount,
                category: candidate.mapped.category,
                isin: candidate.mapped.isin,
                note: candidate.mapped.note,
            });
        }

        Ok(plan)
    }
}

/// `existing` with `incoming` upserted on ISIN, the way the store writes them.
/// Lines not stored yet carry id 0.
fn projected_lines(
    existing: Vec<PortfolioLine>,
    incoming: &[NewPortfolioLine],
) -> Vec<PortfolioLine> {
    let mut lines = existing;
    for line in incoming {
        match lines
            .iter_mut()
            .find(|l| l.asset_id == line.asset_id && l.isin == line.isin)
        {
            Some(current) => current.units = line.units,
            None => lines.push(PortfolioLine {
                id: 0,
                asset_id: line.asset_id,
                isin: line.isin.clone(),
                label: line.label.clone(),
                units: line.units,
                avg_price: line.avg_price,
                product_type: line.product_type.clone(),
            }),
        }
    }
    lines
}

fn new_event(user_id: i64, asset_id: i64, candidate: &Candidate<'_>) -> NewLedgerEvent {
    let mut data = EventData::new();
    data.insert(
        DATA_TR_UID.to_string(),
        Value::String(candidate.identity.clone()),
    );
    data.insert(DATA_TR_RAW.to_string(), candidate.tx.raw.clone());

    let mapped = &candidate.mapped;
    let mut event = NewLedgerEvent::posted(user_id, asset_id, mapped.kind, candidate.value_date)
        .with_amount(candidate.amount)
        .with_data(data);
    event.quantity = mapped.quantity;
    event.unit_price = mapped.unit_price;
    event.isin = mapped.isin.clone();
    event.category = mapped.category.clone();
    event.note = mapped.note.clone();
    event
}

fn incoming_change<T: PartialEq + Clone>(
    current: &Option<T>,
    incoming: &Option<T>,
) -> Option<Option<T>> {
    match incoming {
        Some(value) if current.as_ref() != Some(value) => Some(Some(value.clone())),
        _ => None,
    }
}

/// Fields where the broker now says something different. Missing incoming
/// values never clear stored ones and the kind is never changed.
fn reconcile_patch(event: &LedgerEvent, mapped: &MappedEvent) -> LedgerEventUpdate {
    // The category belongs to the kind, so it is kept along with it.
    let same_kind = event.kind == mapped.kind;
    if !same_kind {
        debug!(
            "Broker now reports event {} as {}, keeping {}",
            event.id, mapped.kind, event.kind
        );
    }

    LedgerEventUpdate {
        value_date: mapped.value_date.filter(|d| *d != event.value_date),
        amount: incoming_change(&event.amount, &mapped.amount),
        quantity: incoming_change(&event.quantity, &mapped.quantity),
        unit_price: incoming_change(&event.unit_price, &mapped.unit_price),
        isin: incoming_change(&event.isin, &mapped.isin),
        category: if same_kind {
            incoming_change(&event.category, &mapped.category)
        } else {
            None
        },
        note: incoming_change(&event.note, &mapped.note),
        ..Default::default()
    }
}

#[async_trait]
impl ReconciliationServiceTrait for ReconciliationService {
    async fn reconcile(
        &self,
        user_id: i64,
        asset_id: i64,
        portfolio: &BrokerPortfolio,
        options: SyncOptions,
    ) -> Result<ReconciliationReport> {
        let asset = get_owned_asset(self.assets.as_ref(), user_id, asset_id)?;
        let mut report = ReconciliationReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        let positions = options
            .apply_positions
            .then(|| self.positions_write(asset.id, portfolio));
        let mut batch = LedgerWriteBatch::default();
        // Existing events whose only change is the link; the store does not
        // count them as updated.
        let mut link_only = 0;

        if options.apply_transactions {
            let stored = self.assets.list_portfolio_lines(asset.id)?;
            let lines = match &positions {
                Some(write) => projected_lines(stored, &write.lines),
                None => stored,
            };
            let plan = self.plan(user_id, asset.id, &portfolio.transactions, &lines)?;
            report.skipped = plan.skipped;
            report.unchanged = plan.unchanged;
            report.created = plan.inserts.len();
            link_only = plan.link_only;
            report.updated = plan.updates.len() + link_only;
            report.linked = plan.links.len();
            if options.dry_run {
                report.preview = plan.preview;
            }
            batch.groups = plan.inserts.into_iter().map(|event| vec![event]).collect();
            batch.updates = plan.updates;
            batch.links = plan.links;
        }

        if options.apply_cash_balance {
            if let Some(cash) = portfolio.cash {
                batch.asset_value = Some(AssetValueUpdate {
                    asset_id: asset.id,
                    value: Some(cash),
                });
                report.cash_applied = Some(cash);
            }
        }

        if options.dry_run {
            if let Some(write) = &positions {
                report.positions = Some(self.preview_positions(write)?);
            }
        } else {
            batch.positions = positions;
            let has_positions = batch.positions.is_some();
            if !batch.is_empty() {
                // Positions, events, links and cash commit together or not at all.
                let outcome = self.ledger.apply_batch(batch).await?;
                report.created = outcome.inserted_events();
                report.updated = outcome.updated + link_only;
                report.unchanged += outcome.skipped_groups();
                report.linked = outcome.linked;
                if has_positions {
                    report.positions = Some(PositionsReport {
                        catalog_created: outcome.catalog.created,
                        catalog_existing: outcome.catalog.existing,
                        lines_written: outcome.lines_written,
                    });
                }
            }
        }

        info!(
            "Broker sync for asset {}{}: {} created, {} updated, {} unchanged, {} skipped, {} linked",
            asset.id,
            if options.dry_run { " (dry run)" } else { "" },
            report.created,
            report.updated,
            report.unchanged,
            report.skipped,
            report.linked
        );

        Ok(report)
    }
}
