//! Temp-file databases for repository tests.

use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use tempfile::TempDir;

use crate::db::{create_pool, get_connection, prepare_database, run_migrations, spawn_writer};
use crate::db::{DbPool, WriteHandle};
use crate::schema::assets;

pub struct TestDb {
    pub pool: Arc<DbPool>,
    pub writer: WriteHandle,
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
}

/// Migrated database in a fresh temp directory. Must run inside a Tokio runtime.
pub fn setup() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db").to_string_lossy().into_owned();
    prepare_database(&db_path).expect("Failed to prepare database");
    let pool = create_pool(&db_path).expect("Failed to create pool");
    run_migrations(&pool).expect("Failed to run migrations");
    let writer = spawn_writer((*pool).clone());
    TestDb {
        pool,
        writer,
        _dir: dir,
    }
}

impl TestDb {
    /// Inserts a bare asset row and returns its id.
    pub fn insert_asset(&self, user_id: i64, kind: &str, label: &str) -> i64 {
        let mut conn = get_connection(&self.pool).expect("Failed to get connection");
        diesel::insert_into(assets::table)
            .values((
                assets::user_id.eq(user_id),
                assets::kind.eq(kind),
                assets::label.eq(label),
                assets::created_at.eq(Utc::now().naive_utc()),
            ))
            .returning(assets::id)
            .get_result(&mut conn)
            .expect("Failed to insert asset")
    }
}
