//! Patrimoine Core - ledger, scheduling and reconciliation domain.
//!
//! This crate contains the business logic of the ledger: the event model,
//! the recurrence engine, the transfer coordinator, the scheduled-obligation
//! materializer and the balance projection. It is database-agnostic and
//! defines traits that are implemented by the `storage-sqlite` crate.

pub mod assets;
pub mod balances;
pub mod brokers;
pub mod catalog;
pub mod constants;
pub mod errors;
pub mod ledger;
pub mod recurrence;
pub mod schedules;
pub mod secrets;
pub mod transfers;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
