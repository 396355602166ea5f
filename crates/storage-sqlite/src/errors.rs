//! Diesel and r2d2 failures, and their mapping onto `patrimoine_core::Error`.

use diesel::result::Error as DieselError;
use patrimoine_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Errors raised inside this crate. Never returned past a repository method.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A core error raised inside a write job; handed back to the caller untouched.
    #[error(transparent)]
    Core(Error),
}

/// Lets write jobs return core errors through the transaction wrapper.
impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::Core(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => {
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            }
            StorageError::PoolError(e) => {
                Error::Database(DatabaseError::PoolCreationFailed(e.to_string()))
            }
            StorageError::QueryFailed(DieselError::NotFound) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::QueryFailed(DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            )) => Error::Database(DatabaseError::UniqueViolation(info.message().to_string())),
            StorageError::QueryFailed(DieselError::DatabaseError(
                diesel::result::DatabaseErrorKind::ForeignKeyViolation,
                info,
            )) => Error::Database(DatabaseError::ForeignKeyViolation(
                info.message().to_string(),
            )),
            StorageError::QueryFailed(e) => {
                Error::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::SerializationError(e) => Error::Database(DatabaseError::Internal(e)),
            StorageError::Core(e) => e,
        }
    }
}

/// `.into_core()` on Diesel and pool results, for read paths outside the writer.
pub trait IntoCore<T> {
    fn into_core(self) -> patrimoine_core::Result<T>;
}

impl<T> IntoCore<T> for std::result::Result<T, DieselError> {
    fn into_core(self) -> patrimoine_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

impl<T> IntoCore<T> for std::result::Result<T, r2d2::Error> {
    fn into_core(self) -> patrimoine_core::Result<T> {
        self.map_err(|e| StorageError::from(e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrimoine_core::ledger::LedgerError;

    #[test]
    fn core_errors_survive_the_round_trip() {
        let storage: StorageError = Error::from(LedgerError::NotFound("Event 9".into())).into();
        let back: Error = storage.into();
        assert!(back.is_not_found());
    }

    #[test]
    fn diesel_not_found_maps_to_database_not_found() {
        let err: patrimoine_core::Result<()> = Err(DieselError::NotFound).into_core();
        assert!(matches!(
            err,
            Err(Error::Database(DatabaseError::NotFound(_)))
        ));
    }
}
