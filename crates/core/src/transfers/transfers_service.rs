use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::transfers_model::{NewTransfer, TransferResult};
use super::transfers_traits::TransferServiceTrait;
use crate::assets::{get_owned_asset, AssetRepositoryTrait};
use crate::errors::{Error, Result};
use crate::ledger::{
    EventKind, EventQuery, EventUpdateOp, LedgerError, LedgerEvent, LedgerEventUpdate,
    LedgerRepositoryTrait, NewLedgerEvent,
};

pub struct TransferService {
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    asset_repository: Arc<dyn AssetRepositoryTrait>,
}

impl TransferService {
    pub fn new(
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        asset_repository: Arc<dyn AssetRepositoryTrait>,
    ) -> Self {
        Self {
            ledger_repository,
            asset_repository,
        }
    }

    fn ensure_asset_owned(&self, user_id: i64, asset_id: i64) -> Result<()> {
        match get_owned_asset(self.asset_repository.as_ref(), user_id, asset_id) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(Error::invalid(format!(
                "Asset {} is not owned by the requesting user",
                asset_id
            ))),
            Err(e) => Err(e),
        }
    }

    fn load_transfer_half(&self, user_id: i64, event_id: i64) -> Result<(LedgerEvent, String)> {
        let event = self.ledger_repository.get_event(user_id, event_id)?;
        let group = match (event.kind, event.transfer_group_id.as_deref()) {
            (EventKind::Transfer, Some(group)) => group.to_string(),
            _ => {
                return Err(LedgerError::InvalidData(format!(
                    "Event {} is not part of a transfer",
                    event_id
                ))
                .into())
            }
        };
        Ok((event, group))
    }
}

/// Per-event patches for a cascaded update of a transfer.
///
/// The referenced event gets `patch` with the amount re-signed; siblings get
/// the shared fields (status, dates, recurrence, note, category, data) and
/// the new magnitude under their own sign.
pub fn cascade_updates(
    user_id: i64,
    target: &LedgerEvent,
    group: &[LedgerEvent],
    patch: &LedgerEventUpdate,
) -> Result<Vec<EventUpdateOp>> {
    let magnitude = match patch.amount {
        Some(Some(amount)) => Some(amount.abs()),
        Some(None) => {
            return Err(LedgerError::InvalidData("A transfer amount cannot be cleared".into()).into())
        }
        None => None,
    };
    if magnitude.is_some_and(|m| m.is_zero()) {
        return Err(Error::invalid("Transfer amount must be greater than zero"));
    }

    let signed = |event: &LedgerEvent| {
        magnitude.map(|m| {
            if event.amount.is_some_and(|a| a < Decimal::ZERO) {
                Some(-m)
            } else {
                Some(m)
            }
        })
    };

    let mut ops = Vec::with_capacity(group.len());
    for event in group {
        let event_patch = if event.id == target.id {
            LedgerEventUpdate {
                amount: signed(event),
                ..patch.clone()
            }
        } else {
            LedgerEventUpdate {
                status: patch.status,
                value_date: patch.value_date,
                rrule: patch.rrule.clone(),
                end_date: patch.end_date,
                amount: signed(event),
                category: patch.category.clone(),
                note: patch.note.clone(),
                data: patch.data.clone(),
                ..Default::default()
            }
        };
        if !event_patch.is_empty() {
            ops.push(EventUpdateOp {
                user_id,
                event_id: event.id,
                patch: event_patch,
            });
        }
    }
    Ok(ops)
}

#[async_trait]
impl TransferServiceTrait for TransferService {
    fn get_transfer_group(&self, user_id: i64, group_id: &str) -> Result<Vec<LedgerEvent>> {
        self.ledger_repository
            .query_events(user_id, &EventQuery::for_transfer_group(group_id))
    }

    async fn create_transfer(&self, user_id: i64, transfer: NewTransfer) -> Result<TransferResult> {
        if transfer.amount <= Decimal::ZERO {
            return Err(Error::invalid("Transfer amount must be greater than zero"));
        }
        if transfer.source_asset_id == transfer.target_asset_id {
            return Err(Error::invalid(
                "Source and target assets of a transfer must differ",
            ));
        }
        self.ensure_asset_owned(user_id, transfer.source_asset_id)?;
        self.ensure_asset_owned(user_id, transfer.target_asset_id)?;

        let group_id = Uuid::new_v4().to_string();
        let half = |asset_id: i64, counterpart: i64, amount: Decimal| {
            let mut event = NewLedgerEvent::posted(
                user_id,
                asset_id,
                EventKind::Transfer,
                transfer.value_date,
            )
            .with_amount(amount);
            event.target_asset_id = Some(counterpart);
            event.transfer_group_id = Some(group_id.clone());
            event.status = transfer.status.unwrap_or_default();
            event.rrule = transfer.rrule.clone();
            event.end_date = transfer.end_date;
            event.category = transfer.category.clone();
            event.note = transfer.note.clone();
            event.data = transfer.data.clone().unwrap_or_default();
            event
        };

        let debit = half(
            transfer.source_asset_id,
            transfer.target_asset_id,
            -transfer.amount,
        );
        let credit = half(
            transfer.target_asset_id,
            transfer.source_asset_id,
            transfer.amount,
        );

        let created = self
            .ledger_repository
            .create_events(vec![debit, credit])
            .await?;
        match created.as_slice() {
            [d, c] => {
                debug!(
                    "Created transfer {} ({} -> {}, {})",
                    group_id, transfer.source_asset_id, transfer.target_asset_id, transfer.amount
                );
                Ok(TransferResult {
                    debit_id: d.id,
                    credit_id: c.id,
                    group_id,
                })
            }
            _ => Err(Error::Unexpected(format!(
                "Expected two events for transfer {}, store returned {}",
                group_id,
                created.len()
            ))),
        }
    }

    async fn update_transfer(
        &self,
        user_id: i64,
        event_id: i64,
        patch: LedgerEventUpdate,
        cascade: bool,
    ) -> Result<Vec<LedgerEvent>> {
        let (event, group_id) = self.load_transfer_half(user_id, event_id)?;

        if !cascade {
            warn!(
                "Updating transfer half {} of group {} without cascade",
                event_id, group_id
            );
            return self
                .ledger_repository
                .update_events(vec![EventUpdateOp {
                    user_id,
                    event_id,
                    patch,
                }])
                .await;
        }

        let group = self.get_transfer_group(user_id, &group_id)?;
        let ops = cascade_updates(user_id, &event, &group, &patch)?;
        if ops.is_empty() {
            return Ok(group);
        }
        self.ledger_repository.update_events(ops).await
    }

    async fn delete_transfer(&self, user_id: i64, event_id: i64, cascade: bool) -> Result<usize> {
        let (_, group_id) = self.load_transfer_half(user_id, event_id)?;

        let ids = if cascade {
            self.get_transfer_group(user_id, &group_id)?
                .into_iter()
                .map(|e| e.id)
                .collect()
        } else {
            warn!(
                "Deleting transfer half {} of group {} without cascade",
                event_id, group_id
            );
            vec![event_id]
        };
        self.ledger_repository.delete_events(user_id, ids).await
    }
}
