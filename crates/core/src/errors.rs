//! Core error types for the patrimoine ledger.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use thiserror::Error;

use crate::ledger::LedgerError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type.
///
/// Database-specific errors are wrapped in string form to keep this type
/// database-agnostic.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("External collaborator failed: {0}")]
    External(#[from] ExternalError),

    #[error("Secret store error: {0}")]
    Secret(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Shorthand for an `InvalidInput` validation failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::InvalidInput(message.into()))
    }

    /// True for rejections caused by the caller's input (no state change happened).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Ledger(LedgerError::InvalidData(_))
                | Error::Ledger(LedgerError::UnknownIsin(_))
        )
    }

    /// True when the referenced record does not exist or is not visible to the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Ledger(LedgerError::NotFound(_))
                | Error::Database(DatabaseError::NotFound(_))
        )
    }

    /// True when retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::External(e) => e.is_retryable(),
            Error::Database(DatabaseError::ConnectionFailed(_))
            | Error::Database(DatabaseError::PoolCreationFailed(_)) => true,
            _ => false,
        }
    }
}

/// Store failures, carried as text so this crate stays free of driver types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// Usually an idempotency key that is already taken.
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The write transaction could not commit (busy or locked store).
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row that this crate cannot read back.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Rejected caller input. Nothing is written when one of these is returned.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Failures of collaborators outside this system (broker, secret cipher).
#[derive(Error, Debug)]
pub enum ExternalError {
    /// The broker could not be reached or timed out.
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// The broker answered but refused the request (bad credentials, expired session).
    #[error("Broker rejected the request: {0}")]
    BrokerRejected(String),

    /// A stored secret could not be decrypted (tampered token or wrong key).
    #[error("Failed to decrypt secret: {0}")]
    Decrypt(String),
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExternalError::BrokerUnavailable(_))
    }
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Unexpected(err.to_string())
    }
}
