use thiserror::Error;

/// Errors raised by ledger validation and lookups.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid ledger event: {0}")]
    InvalidData(String),

    #[error("Ledger event not found: {0}")]
    NotFound(String),

    #[error("ISIN '{0}' is not in the product catalog")]
    UnknownIsin(String),

    #[error("Transfer group {0} is not a valid pair")]
    BrokenTransfer(String),
}
