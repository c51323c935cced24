/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::fs;
use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::info;

pub mod config;
pub mod errors;
pub mod fetchers;
pub mod models;
pub mod pacer;
pub mod parsers;
pub mod pipeline;
pub mod scanner;
pub mod schema;
pub mod store;

#[cfg(test)]
mod tests;

use errors::StoreError;

// Embed migrations from the default "./migrations" folder
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Convenient alias for your app.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// PRAGMAs are per connection, so they are applied on every checkout.
#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Build a thread-safe SQLite connection pool.
/// `db_path` is a file path; the file is created if missing.
pub fn establish_connection(db_path: &str) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);

    // Tune pool size as needed.
    Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
        .map_err(|e| StoreError::Pool(format!("creating SQLite pool for {db_path}: {e}")))
}

/// Ensure the DB file's directory exists, build the pool and apply pending
/// embedded migrations.
pub fn open_pool(db_path: &str) -> Result<DbPool, StoreError> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("create_dir_all({}): {e}", parent.display()))
            })?;
        }
    }

    let pool = establish_connection(db_path)?;
    let mut conn = store::checkout(&pool)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreError::Migration(e.to_string()))?;

    info!("Database ready and migrations applied at {db_path}");
    Ok(pool)
}
