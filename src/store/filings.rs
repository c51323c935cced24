/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use diesel::prelude::*;
use log::debug;

use super::{Conn, KEY_LOOKUP_BATCH, checkout};
use crate::DbPool;
use crate::errors::StoreError;
use crate::models::Filing;
use crate::schema::{entities, filings};

/// Rows per insert statement (5 bound columns each).
const INSERT_BATCH: usize = 2_000;

/// Which stored filings are candidates for document download.
#[derive(Debug, Clone, Default)]
pub struct DownloadQuery {
    pub forms: BTreeSet<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Filers with one of these SIC codes are skipped; a NULL SIC is kept.
    pub excluded_sic: Vec<String>,
    pub limit: Option<i64>,
}

/// Filing rows keyed by accession number. Writes never overwrite.
#[derive(Clone)]
pub struct FilingStore {
    pool: DbPool,
}

impl FilingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        checkout(&self.pool)
    }

    /// Insert filings whose accession number is new; returns how many were inserted.
    pub fn insert_ignore(&self, records: &[Filing]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let inserted = conn.transaction::<usize, StoreError, _>(|conn| {
            let mut n = 0;
            for batch in records.chunks(INSERT_BATCH) {
                n += diesel::insert_or_ignore_into(filings::table)
                    .values(batch)
                    .execute(conn)?;
            }
            Ok(n)
        })?;
        debug!("inserted {inserted} of {} filings", records.len());
        Ok(inserted)
    }

    pub fn existing_keys(&self, accessions: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn()?;
        let mut out = HashSet::new();
        for batch in accessions.chunks(KEY_LOOKUP_BATCH) {
            let found: Vec<String> = filings::table
                .select(filings::accession_number)
                .filter(filings::accession_number.eq_any(batch))
                .load(&mut conn)?;
            out.extend(found);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        Ok(filings::table.count().get_result(&mut conn)?)
    }

    /// Filings of the requested forms, newest first, excluding filers in
    /// non-operating industries.
    pub fn find_for_download(&self, q: &DownloadQuery) -> Result<Vec<Filing>, StoreError> {
        if q.forms.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let forms: Vec<String> = q.forms.iter().cloned().collect();

        let mut query = filings::table
            .inner_join(entities::table)
            .filter(filings::form_type.eq_any(forms))
            .select(Filing::as_select())
            .order((filings::filing_date.desc(), filings::accession_number.asc()))
            .into_boxed();

        if let Some(start) = q.start_date {
            query = query.filter(filings::filing_date.ge(start));
        }
        if let Some(end) = q.end_date {
            query = query.filter(filings::filing_date.le(end));
        }
        if !q.excluded_sic.is_empty() {
            query = query.filter(
                entities::sic
                    .is_null()
                    .or(entities::sic.assume_not_null().ne_all(q.excluded_sic.clone())),
            );
        }
        if let Some(limit) = q.limit {
            query = query.limit(limit);
        }

        Ok(query.load(&mut conn)?)
    }
}
