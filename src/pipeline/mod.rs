/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

//! Orchestration of the four run modes: bulk load, incremental update,
//! quarterly backfill and document download.
//!
//! Every mode works in units (chunk, day, quarter, document). A unit either
//! completes or is logged and skipped; only storage and setup failures end a
//! run early. All writes are upserts or insert-ignores, so re-running any mode
//! is safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;
use serde::Serialize;

use crate::DbPool;
use crate::config::Settings;
use crate::errors::{PipelineError, StoreError};
use crate::fetchers::{
    BulkArchiveFetcher, DocumentFetcher, MasterIndexFetcher, SecClient, SubmissionsApiFetcher,
};
use crate::models::{Entity, Filing, IndexedFiling};
use crate::pacer::RequestPacer;
use crate::scanner::FilingIndexPageScanner;
use crate::store::{CompanyStore, FilingStore};

pub mod backfill;
pub mod bulk;
pub mod documents;
pub mod incremental;
pub mod pool;

pub use documents::sanitize_filename;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub files_found: usize,
    pub files_parsed: usize,
    /// Files that could not be parsed at all (bad name, unreadable, invalid JSON).
    pub files_failed: usize,
    /// Malformed filing rows skipped inside otherwise good files.
    pub record_errors: usize,
    pub chunks_committed: usize,
    pub entities_affected: usize,
    pub filings_inserted: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncrementalReport {
    pub days_checked: usize,
    pub days_absent: usize,
    pub days_failed: usize,
    pub filings_seen: usize,
    pub filings_inserted: usize,
    pub entities_refreshed: usize,
    /// Entities the metadata endpoint does not know (404).
    pub entities_missing: usize,
    pub entity_failures: usize,
    /// False means "completed with warnings".
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub quarters_processed: usize,
    pub quarters_absent: usize,
    pub quarters_failed: usize,
    pub filings_inserted: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub succeeded: usize,
    /// Preparation failures plus download failures.
    pub failed: usize,
    pub skipped_existing: usize,
    /// Structured-finance filings; already counted in `failed`.
    pub skipped_structured_finance: usize,
}

/// Owns every collaborator of a run. One shared pacer sits behind all fetchers.
pub struct Pipeline {
    settings: Settings,
    bulk: BulkArchiveFetcher,
    index: MasterIndexFetcher,
    submissions: SubmissionsApiFetcher,
    documents: DocumentFetcher,
    scanner: FilingIndexPageScanner,
    companies: CompanyStore,
    filings: FilingStore,
}

impl Pipeline {
    pub fn new(settings: Settings, pool: DbPool) -> Result<Self, PipelineError> {
        let pacer = Arc::new(RequestPacer::new(settings.rate_limit)?);
        let client = Arc::new(
            SecClient::new(&settings.user_agent, pacer)
                .map_err(|e| PipelineError::Setup(e.to_string()))?,
        );
        let archive = settings.archive_data_url();

        info!(
            "Pipeline ready (base={}, rate limit={:?})",
            settings.base_url, settings.rate_limit
        );

        Ok(Self {
            bulk: BulkArchiveFetcher::new(Arc::clone(&client)),
            index: MasterIndexFetcher::new(Arc::clone(&client), &settings.base_url),
            submissions: SubmissionsApiFetcher::new(Arc::clone(&client), &settings.api_base_url),
            documents: DocumentFetcher::new(Arc::clone(&client), &archive),
            scanner: FilingIndexPageScanner::new(client, &archive),
            companies: CompanyStore::new(pool.clone()),
            filings: FilingStore::new(pool),
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn companies(&self) -> &CompanyStore {
        &self.companies
    }

    pub fn filings(&self) -> &FilingStore {
        &self.filings
    }

    /// Seed placeholder entities for index-sourced filings, then insert-ignore
    /// the filings. Placeholders never replace existing rows.
    fn store_indexed(&self, rows: &[IndexedFiling]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut stubs: BTreeMap<&str, Entity> = BTreeMap::new();
        for r in rows {
            stubs
                .entry(r.filing.entity_id.as_str())
                .or_insert_with(|| Entity::stub(&r.filing.entity_id, stub_name(r)));
        }
        let stubs: Vec<Entity> = stubs.into_values().collect();
        let seeded = self.companies.ensure_exist(&stubs)?;
        if seeded > 0 {
            info!("Seeded {seeded} placeholder entities from index rows");
        }

        let filings: Vec<Filing> = rows.iter().map(|r| r.filing.clone()).collect();
        self.filings.insert_ignore(&filings)
    }
}

fn stub_name(r: &IndexedFiling) -> String {
    if r.company_name.is_empty() {
        format!("Entity {}", r.filing.entity_id)
    } else {
        r.company_name.clone()
    }
}
