//! Ledger event store contract.
//!
//! Models, validation and the repository contract for [`LedgerEvent`], the
//! atomic unit of the ledger. Storage backends implement
//! [`LedgerRepositoryTrait`]; callers go through [`LedgerService`].

mod idempotency;
mod ledger_constants;
mod ledger_errors;
mod ledger_model;
mod ledger_service;
mod ledger_traits;

#[cfg(test)]
mod ledger_model_tests;

pub use idempotency::IdempotencyKey;
pub use ledger_constants::*;
pub use ledger_errors::LedgerError;
pub use ledger_model::{
    AssetValueUpdate, BatchOutcome, EventData, EventKind, EventQuery, EventStatus, EventUpdateOp,
    GroupOutcome, LedgerEvent, LedgerEventInput, LedgerEventUpdate, LedgerWriteBatch, LineLinkOp,
    LinkTarget, NewLedgerEvent, PositionsWrite,
};
pub use ledger_service::LedgerService;
pub use ledger_traits::{LedgerRepositoryTrait, LedgerServiceTrait};
