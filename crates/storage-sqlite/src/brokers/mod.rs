//! SQLite storage implementation for broker links.

mod repository;

pub use repository::{BrokerLinkDB, BrokerLinkRepository};
