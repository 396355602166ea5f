//! SQLite storage implementation for ledger events.

mod model;
mod repository;

pub use model::{LedgerEventDB, NewLedgerEventDB};
pub use repository::LedgerRepository;
