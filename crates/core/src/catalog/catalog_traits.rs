use async_trait::async_trait;

use super::catalog_model::{CatalogUpsertResult, PositionSnapshot};
use crate::errors::Result;

#[async_trait]
pub trait ProductCatalogTrait: Send + Sync {
    fn is_known(&self, isin: &str) -> Result<bool>;

    /// Adds the securities of `positions` that are not catalogued yet.
    /// Positions without an ISIN are ignored.
    async fn upsert_from_positions(
        &self,
        positions: Vec<PositionSnapshot>,
    ) -> Result<CatalogUpsertResult>;
}
