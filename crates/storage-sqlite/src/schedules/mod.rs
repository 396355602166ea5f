//! SQLite storage implementation for materializer job runs.

mod model;
mod repository;

pub use model::JobRunDB;
pub use repository::JobRunRepository;
