//! Balance projection: effective balance of cash-like assets.

mod balances_model;
mod balances_service;


pub use balances_model::EffectiveBalance;
pub use balances_service::{BalanceService, BalanceServiceTrait};
