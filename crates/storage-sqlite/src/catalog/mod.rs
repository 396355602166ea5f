//! SQLite storage implementation for the product catalog.

mod repository;

pub use repository::{ProductCatalogRepository, ProductDB};
pub(crate) use repository::upsert_products;
