//! Transfer coordinator: paired debit/credit events kept consistent.

mod transfers_model;
mod transfers_service;
mod transfers_traits;

#[cfg(test)]
mod transfers_service_tests;

pub use transfers_model::{NewTransfer, TransferResult};
pub use transfers_service::{cascade_updates, TransferService};
pub use transfers_traits::TransferServiceTrait;
