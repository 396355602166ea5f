//! Helpers shared by the repositories: `IN (...)` chunking and decimal columns.
//!
//! Decimals are stored as TEXT so no precision is lost to SQLite's REAL type.

use std::str::FromStr;

use patrimoine_core::errors::{DatabaseError, Error, Result};
use rust_decimal::Decimal;

/// Maximum number of parameters for SQLite IN (...) queries.
///
/// SQLite caps the number of bound parameters per statement (999 on older
/// builds). 500 leaves room for the other filters of the query.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Chunk a slice into smaller slices for batch SQLite queries.
///
/// ```ignore
/// let mut found = HashMap::new();
/// for chunk in chunk_for_sqlite(&uids) {
///     found.extend(load_by_uids(conn, chunk)?);
/// }
/// ```
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

pub fn decimal_to_text(value: Decimal) -> String {
    value.normalize().to_string()
}

pub fn optional_decimal_to_text(value: Option<Decimal>) -> Option<String> {
    value.map(decimal_to_text)
}

/// Parses a TEXT decimal column. A malformed value means the row was written
/// by something other than this crate.
pub fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim()).map_err(|e| {
        Error::Database(DatabaseError::Internal(format!(
            "Column '{}' holds a malformed decimal '{}': {}",
            column, raw, e
        )))
    })
}

pub fn parse_optional_decimal(raw: Option<&str>, column: &str) -> Result<Option<Decimal>> {
    raw.map(|r| parse_decimal(r, column)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_chunk_for_sqlite_empty() {
        let items: Vec<i32> = vec![];
        assert_eq!(chunk_for_sqlite(&items).count(), 0);
    }

    #[test]
    fn test_chunk_for_sqlite_over_limit() {
        let items: Vec<i32> = (0..1200).collect();
        let chunks: Vec<_> = chunk_for_sqlite(&items).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), SQLITE_MAX_PARAMS_CHUNK);
        assert_eq!(chunks[2].len(), 200);
    }

    #[test]
    fn decimals_are_stored_without_trailing_zeros() {
        assert_eq!(decimal_to_text(dec!(150.00)), "150");
        assert_eq!(decimal_to_text(dec!(-12.50)), "-12.5");
        assert_eq!(parse_decimal(" 1159.92 ", "amount").unwrap(), dec!(1159.92));
    }

    #[test]
    fn malformed_decimal_is_an_internal_error() {
        let err = parse_decimal("12,5", "amount").unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::Internal(_))));
    }
}
