//! Product catalog contract: the set of securities known to the system.

mod catalog_model;
mod catalog_traits;

pub use catalog_model::{normalize_isin, CatalogUpsertResult, PositionSnapshot, Product};
pub use catalog_traits::ProductCatalogTrait;
