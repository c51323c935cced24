/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate};
use log::{debug, error, info, warn};

use super::{IncrementalReport, Pipeline};
use crate::errors::{FetchError, PipelineError};
use crate::fetchers::Fetched;
use crate::models::{Entity, IndexedFiling};
use crate::parsers::master_index::parse_master_index;
use crate::parsers::submissions::parse_value;

/// Outcome of one per-entity metadata refresh.
enum Refresh {
    Updated(Entity),
    Missing,
    Failed,
}

impl Pipeline {
    /// Check the last `days` daily indices (ending today).
    pub fn run_incremental(&self, days: u32) -> Result<IncrementalReport, PipelineError> {
        self.run_incremental_until(days, Local::now().date_naive())
    }

    /// Check the `days` daily indices ending at `last_day`, oldest first.
    ///
    /// Every distinct entity referenced by the merged filings is re-fetched from
    /// the submissions endpoint and upserted, not only the new ones.
    pub fn run_incremental_until(
        &self,
        days: u32,
        last_day: NaiveDate,
    ) -> Result<IncrementalReport, PipelineError> {
        let mut report = IncrementalReport {
            success: true,
            ..Default::default()
        };
        let dates: Vec<NaiveDate> = (0..days)
            .rev()
            .filter_map(|back| last_day.checked_sub_days(Days::new(u64::from(back))))
            .collect();
        if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
            info!("Incremental update over {first}..={last}");
        }

        let mut merged: BTreeMap<String, IndexedFiling> = BTreeMap::new();
        for date in dates {
            report.days_checked += 1;
            let text = match self.index.daily_index(date) {
                Ok(Fetched::Found(t)) => t,
                Ok(Fetched::Absent) => {
                    report.days_absent += 1;
                    continue;
                }
                Err(e) => {
                    error!("Daily index for {date} failed: {e}; skipping day");
                    report.days_failed += 1;
                    report.success = false;
                    continue;
                }
            };
            match parse_master_index(&text, &format!("daily {date}"), None) {
                Ok(parsed) => {
                    debug!("{} filings in daily index {date}", parsed.filings.len());
                    for row in parsed.filings {
                        merged.insert(row.filing.accession_number.clone(), row);
                    }
                }
                Err(e) => {
                    error!("Daily index for {date} unparseable: {e}; skipping day");
                    report.days_failed += 1;
                    report.success = false;
                }
            }
        }

        report.filings_seen = merged.len();
        if merged.is_empty() {
            info!("No filings found in recent daily indices");
            return Ok(report);
        }

        let rows: Vec<IndexedFiling> = merged.into_values().collect();
        report.filings_inserted = self.store_indexed(&rows).inspect_err(|e| {
            error!("Storing daily filings failed: {e}; aborting incremental update");
        })?;
        info!(
            "{} of {} filings from daily indices were new",
            report.filings_inserted, report.filings_seen
        );

        let ciks: BTreeSet<&str> = rows.iter().map(|r| r.filing.entity_id.as_str()).collect();
        let total = ciks.len();
        info!("Refreshing metadata for {total} entities");

        let mut refreshed = Vec::new();
        for (i, cik) in ciks.into_iter().enumerate() {
            if (i + 1) % 50 == 0 {
                info!("Entity metadata progress: {}/{total}", i + 1);
            }
            match self.refresh_entity(cik) {
                Refresh::Updated(e) => refreshed.push(e),
                Refresh::Missing => {
                    report.entities_missing += 1;
                    report.success = false;
                }
                Refresh::Failed => {
                    report.entity_failures += 1;
                    report.success = false;
                }
            }
        }

        report.entities_refreshed = refreshed.len();
        self.companies.upsert(&refreshed).inspect_err(|e| {
            error!("Entity upsert failed: {e}; incremental update incomplete");
        })?;

        info!(
            "Incremental update finished: {} new filings, {} entities refreshed, {} missing, {} failed",
            report.filings_inserted,
            report.entities_refreshed,
            report.entities_missing,
            report.entity_failures
        );
        Ok(report)
    }

    /// Fetch one entity's metadata, retrying transient failures with
    /// exponential backoff. A 404 is final.
    fn refresh_entity(&self, cik: &str) -> Refresh {
        let retries = self.settings.metadata_retries;
        let mut attempt = 0u32;
        loop {
            match self.submissions.fetch(cik) {
                Ok(Fetched::Found(v)) => {
                    return match parse_value(cik, &v).entity {
                        Some(e) => Refresh::Updated(e),
                        None => {
                            warn!("Metadata for {cik} has no entity record");
                            Refresh::Failed
                        }
                    };
                }
                Ok(Fetched::Absent) => {
                    warn!("No metadata for {cik} (404)");
                    return Refresh::Missing;
                }
                Err(e) if e.is_transient() && attempt < retries => {
                    let wait = backoff(self.settings.metadata_backoff_base, attempt);
                    warn!(
                        "Metadata fetch for {cik} failed: {e}; attempt {}/{}, retrying in {wait:?}",
                        attempt + 1,
                        retries + 1
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => {
                    log_final_failure(cik, &e);
                    return Refresh::Failed;
                }
            }
        }
    }
}

/// `base^attempt` seconds.
fn backoff(base: f64, attempt: u32) -> Duration {
    let secs = base.powi(attempt as i32);
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

fn log_final_failure(cik: &str, e: &FetchError) {
    if e.is_transient() {
        error!("Metadata fetch for {cik} failed after retries: {e}");
    } else {
        error!("Metadata fetch for {cik} failed: {e}");
    }
}
