use std::sync::Arc;

use chrono::NaiveDate;
use log::warn;
use rust_decimal::Decimal;

use super::balances_model::EffectiveBalance;
use crate::assets::{get_owned_asset, Asset, AssetKind, AssetRepositoryTrait};
use crate::errors::Result;
use crate::ledger::{EventKind, LedgerRepositoryTrait};

const CASH_KINDS: [EventKind; 2] = [EventKind::CashOp, EventKind::Transfer];

pub trait BalanceServiceTrait: Send + Sync {
    /// Baseline plus posted `cash_op`/`transfer` amounts dated on or before `as_of`.
    fn effective_balance(&self, user_id: i64, asset_id: i64, as_of: NaiveDate)
        -> Result<EffectiveBalance>;

    /// Effective balance of every savings asset of the user.
    fn effective_balances(&self, user_id: i64, as_of: NaiveDate) -> Result<Vec<EffectiveBalance>>;
}

pub struct BalanceService {
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    asset_repository: Arc<dyn AssetRepositoryTrait>,
}

impl BalanceService {
    pub fn new(
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        asset_repository: Arc<dyn AssetRepositoryTrait>,
    ) -> Self {
        Self {
            ledger_repository,
            asset_repository,
        }
    }

    fn project(&self, asset: &Asset, as_of: NaiveDate) -> EffectiveBalance {
        let baseline = asset.current_value.unwrap_or(Decimal::ZERO);
        let (movements, degraded) = match self.ledger_repository.sum_posted_amounts(
            asset.user_id,
            asset.id,
            &CASH_KINDS,
            as_of,
        ) {
            Ok(sum) => (sum, false),
            Err(e) => {
                warn!(
                    "Could not sum ledger movements of asset {}, reporting stored value: {}",
                    asset.id, e
                );
                (Decimal::ZERO, true)
            }
        };
        EffectiveBalance {
            asset_id: asset.id,
            label: asset.label.clone(),
            as_of,
            baseline,
            movements,
            effective: baseline + movements,
            degraded,
        }
    }
}

impl BalanceServiceTrait for BalanceService {
    fn effective_balance(
        &self,
        user_id: i64,
        asset_id: i64,
        as_of: NaiveDate,
    ) -> Result<EffectiveBalance> {
        let asset = get_owned_asset(self.asset_repository.as_ref(), user_id, asset_id)?;
        Ok(self.project(&asset, as_of))
    }

    fn effective_balances(&self, user_id: i64, as_of: NaiveDate) -> Result<Vec<EffectiveBalance>> {
        Ok(self
            .asset_repository
            .list_assets(user_id)?
            .iter()
            .filter(|a| a.kind == AssetKind::Savings)
            .map(|a| self.project(a, as_of))
            .collect())
    }
}
