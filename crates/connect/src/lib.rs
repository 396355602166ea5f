//! Patrimoine Connect - broker reconciliation for the patrimoine ledger.
//!
//! This crate sits at the boundary with the broker: it normalizes the
//! broker's loosely shaped payloads, maps its transaction taxonomy onto
//! ledger events, and upserts them idempotently. It also handles the saved
//! credentials used to open broker sessions.

pub mod broker;

// Re-export commonly used types
pub use broker::{
    BrokerClient, BrokerPayload, BrokerPortfolio, BrokerSessionService,
    BrokerSessionServiceTrait, BrokerTransaction, ConnectChallenge, ReconciliationReport,
    ReconciliationService, ReconciliationServiceTrait, SyncOptions, SyncOrchestrator,
};
