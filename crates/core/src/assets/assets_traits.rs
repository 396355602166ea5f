use async_trait::async_trait;
use rust_decimal::Decimal;

use super::assets_model::{
    Asset, Loan, NewAsset, NewLoan, NewPortfolioLine, PortfolioLine, RecurringDeposit,
};
use crate::errors::Result;

/// Trait defining the contract for asset configuration storage.
#[async_trait]
pub trait AssetRepositoryTrait: Send + Sync {
    /// Fails with `NotFound` when the asset does not exist.
    fn get_asset(&self, asset_id: i64) -> Result<Asset>;
    fn list_assets(&self, user_id: i64) -> Result<Vec<Asset>>;

    /// Every recurring deposit with a positive amount, across all users.
    fn list_recurring_deposits(&self) -> Result<Vec<(Asset, RecurringDeposit)>>;
    /// Every loan with a start date and a positive duration, across all users.
    fn list_loans(&self) -> Result<Vec<(Asset, Loan)>>;

    fn list_portfolio_lines(&self, asset_id: i64) -> Result<Vec<PortfolioLine>>;

    async fn create_asset(&self, new_asset: NewAsset) -> Result<Asset>;
    async fn set_recurring_deposit(&self, deposit: RecurringDeposit) -> Result<RecurringDeposit>;
    async fn create_loan(&self, new_loan: NewLoan) -> Result<Loan>;
    async fn update_current_value(&self, asset_id: i64, value: Option<Decimal>) -> Result<Asset>;

    /// Inserts or refreshes lines keyed by `(asset_id, isin)`. Returns the number written.
    async fn upsert_portfolio_lines(&self, lines: Vec<NewPortfolioLine>) -> Result<usize>;
}
