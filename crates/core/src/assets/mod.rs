//! Asset configuration: holdings, recurring deposits, loans and portfolio lines.

mod assets_model;
mod assets_service;
mod assets_traits;

pub use assets_model::{
    Asset, AssetKind, Loan, NewAsset, NewLoan, NewPortfolioLine, PortfolioLine, RecurringDeposit,
};
pub use assets_service::{get_owned_asset, resolve_open_line};
pub use assets_traits::AssetRepositoryTrait;
