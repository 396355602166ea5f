//! SQLite storage implementation for assets, recurring deposits, loans and portfolio lines.

mod model;
mod repository;

pub use model::{AssetDB, LoanDB, PortfolioLineDB, RecurringDepositDB};
pub use repository::AssetRepository;
pub(crate) use repository::{load_portfolio_lines, set_current_value, upsert_lines};
