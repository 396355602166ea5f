//! SQLite storage implementation for the patrimoine ledger.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `patrimoine-core` and contains:
//! - Database connection pooling and the single-writer actor
//! - Diesel migrations, including the idempotency-key unique indexes
//! - Repository implementations for every persisted entity
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the application where Diesel dependencies exist.
//! All other crates (`core`, `connect`) are database-agnostic and work with traits.
//!
//! ```text
//! core (domain)          connect (broker)
//!       │                      │
//!       └──────────┬───────────┘
//!                  │
//!                  ▼
//!          storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod assets;
pub mod brokers;
pub mod catalog;
pub mod ledger;
pub mod schedules;

#[cfg(test)]
mod testing;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, get_db_path, init, prepare_database, run_migrations,
    spawn_writer, DbConnection, DbPool, WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use assets::AssetRepository;
pub use brokers::BrokerLinkRepository;
pub use catalog::ProductCatalogRepository;
pub use ledger::LedgerRepository;
pub use schedules::JobRunRepository;

// Re-export from patrimoine-core for convenience
pub use patrimoine_core::errors::{DatabaseError, Error, Result};
