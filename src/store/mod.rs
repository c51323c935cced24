/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;

use crate::DbPool;
use crate::errors::StoreError;

pub mod companies;
pub mod filings;

pub use companies::CompanyStore;
pub use filings::{DownloadQuery, FilingStore};

/// Keys per `IN (...)` lookup; stays well under SQLite's bound-parameter limit.
pub(crate) const KEY_LOOKUP_BATCH: usize = 900;

pub(crate) type Conn = PooledConnection<ConnectionManager<SqliteConnection>>;

pub(crate) fn checkout(pool: &DbPool) -> Result<Conn, StoreError> {
    pool.get()
        .map_err(|e| StoreError::Pool(format!("pool error: {e}")))
}
