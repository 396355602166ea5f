use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::ledger_errors::LedgerError;
use super::ledger_model::*;
use super::ledger_traits::{LedgerRepositoryTrait, LedgerServiceTrait};
use crate::assets::{get_owned_asset, resolve_open_line, AssetRepositoryTrait};
use crate::catalog::{normalize_isin, ProductCatalogTrait};
use crate::errors::{Error, Result, ValidationError};
use crate::transfers::{TransferService, TransferServiceTrait};
use crate::utils::time_utils::parse_value_date;

/// Service for creating, editing and listing ledger events on behalf of a user.
pub struct LedgerService {
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    asset_repository: Arc<dyn AssetRepositoryTrait>,
    catalog: Arc<dyn ProductCatalogTrait>,
    transfers: TransferService,
}

impl LedgerService {
    pub fn new(
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        asset_repository: Arc<dyn AssetRepositoryTrait>,
        catalog: Arc<dyn ProductCatalogTrait>,
    ) -> Self {
        let transfers = TransferService::new(ledger_repository.clone(), asset_repository.clone());
        Self {
            ledger_repository,
            asset_repository,
            catalog,
            transfers,
        }
    }

    fn ensure_known_isin(&self, kind: EventKind, isin: Option<&str>) -> Result<()> {
        if !kind.requires_known_isin() {
            return Ok(());
        }
        let isin = isin.ok_or_else(|| {
            Error::Validation(ValidationError::MissingField("isin".to_string()))
        })?;
        if !self.catalog.is_known(isin)? {
            return Err(LedgerError::UnknownIsin(isin.to_string()).into());
        }
        Ok(())
    }

    fn open_line_id(&self, asset_id: i64, isin: Option<&str>) -> Result<Option<i64>> {
        let Some(isin) = isin else {
            return Ok(None);
        };
        let lines = self.asset_repository.list_portfolio_lines(asset_id)?;
        Ok(resolve_open_line(&lines, isin).map(|line| line.id))
    }

    /// Validates a loose API payload into an insertable event.
    fn prepare_new_event(&self, user_id: i64, input: LedgerEventInput) -> Result<NewLedgerEvent> {
        let kind: EventKind = input
            .kind
            .as_deref()
            .ok_or_else(|| Error::Validation(ValidationError::MissingField("kind".to_string())))?
            .parse()?;
        if kind == EventKind::Transfer {
            return Err(LedgerError::InvalidData(
                "Transfers are created as a pair through the transfer coordinator".to_string(),
            )
            .into());
        }

        let status = match input.status.as_deref() {
            Some(s) => s.parse()?,
            None => EventStatus::Posted,
        };

        let raw_date = input
            .value_date
            .as_deref()
            .ok_or_else(|| {
                Error::Validation(ValidationError::MissingField("value_date".to_string()))
            })?;
        let value_date = parse_value_date(raw_date).ok_or_else(|| {
            LedgerError::InvalidData(format!("Invalid value_date '{}'", raw_date))
        })?;
        let end_date = match input.end_date.as_deref() {
            Some(raw) => Some(parse_value_date(raw).ok_or_else(|| {
                LedgerError::InvalidData(format!("Invalid end_date '{}'", raw))
            })?),
            None => None,
        };

        get_owned_asset(self.asset_repository.as_ref(), user_id, input.asset_id)?;
        if let Some(target) = input.target_asset_id {
            get_owned_asset(self.asset_repository.as_ref(), user_id, target)?;
        }

        let isin = normalize_isin(input.isin.as_deref());
        self.ensure_known_isin(kind, isin.as_deref())?;
        let portfolio_line_id = self.open_line_id(input.asset_id, isin.as_deref())?;

        Ok(NewLedgerEvent {
            user_id,
            asset_id: input.asset_id,
            target_asset_id: input.target_asset_id,
            kind,
            status,
            value_date,
            rrule: input.rrule,
            end_date,
            amount: input.amount,
            quantity: input.quantity,
            unit_price: input.unit_price,
            isin,
            portfolio_line_id,
            transfer_group_id: None,
            category: input.category,
            note: input.note,
            data: input.data.unwrap_or_default(),
        })
    }

    /// Normalizes the ISIN of a patch and re-resolves the portfolio line it points to.
    fn prepare_patch(
        &self,
        event: &LedgerEvent,
        mut patch: LedgerEventUpdate,
    ) -> Result<LedgerEventUpdate> {
        if let Some(isin) = patch.isin.take() {
            let isin = normalize_isin(isin.as_deref());
            self.ensure_known_isin(event.kind, isin.as_deref())?;
            if patch.portfolio_line_id.is_none() {
                patch.portfolio_line_id = Some(self.open_line_id(event.asset_id, isin.as_deref())?);
            }
            patch.isin = Some(isin);
        }
        Ok(patch)
    }
}

#[async_trait]
impl LedgerServiceTrait for LedgerService {
    fn get_event(&self, user_id: i64, event_id: i64) -> Result<LedgerEvent> {
        self.ledger_repository.get_event(user_id, event_id)
    }

    fn list_events(&self, user_id: i64, query: &EventQuery) -> Result<Vec<LedgerEvent>> {
        self.ledger_repository.query_events(user_id, query)
    }

    async fn create_event(&self, user_id: i64, input: LedgerEventInput) -> Result<LedgerEvent> {
        let new_event = self.prepare_new_event(user_id, input)?;
        let created = self
            .ledger_repository
            .create_events(vec![new_event])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Unexpected("Store returned no event".to_string()))?;
        debug!(
            "Created {} event {} on asset {}",
            created.kind, created.id, created.asset_id
        );
        Ok(created)
    }

    async fn update_event(
        &self,
        user_id: i64,
        event_id: i64,
        patch: LedgerEventUpdate,
        cascade: bool,
    ) -> Result<Vec<LedgerEvent>> {
        let event = self.ledger_repository.get_event(user_id, event_id)?;
        let patch = self.prepare_patch(&event, patch)?;

        if event.kind == EventKind::Transfer && event.transfer_group_id.is_some() {
            return self
                .transfers
                .update_transfer(user_id, event_id, patch, cascade)
                .await;
        }

        self.ledger_repository
            .update_events(vec![EventUpdateOp {
                user_id,
                event_id,
                patch,
            }])
            .await
    }

    async fn delete_event(&self, user_id: i64, event_id: i64, cascade: bool) -> Result<usize> {
        let event = self.ledger_repository.get_event(user_id, event_id)?;
        if event.kind == EventKind::Transfer && event.transfer_group_id.is_some() {
            return self
                .transfers
                .delete_transfer(user_id, event_id, cascade)
                .await;
        }
        self.ledger_repository
            .delete_events(user_id, vec![event_id])
            .await
    }
}
