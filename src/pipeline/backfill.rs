/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::BTreeSet;

use log::{error, info, warn};

use super::{BackfillReport, Pipeline};
use crate::fetchers::Fetched;
use crate::parsers::master_index::parse_master_index;

impl Pipeline {
    /// Load every quarterly index from `start_year` Q1 through `end_year` Q4.
    ///
    /// `forms` overrides the configured backfill filter; with neither, all forms
    /// are kept. Any failure inside a quarter (fetch, parse, store) skips that
    /// quarter only.
    pub fn run_backfill(
        &self,
        start_year: i32,
        end_year: i32,
        forms: Option<&BTreeSet<String>>,
    ) -> BackfillReport {
        let forms = forms.or(self.settings.backfill_forms.as_ref());
        match forms {
            Some(f) => info!("Backfilling {start_year}..={end_year} for forms {f:?}"),
            None => warn!("Backfilling {start_year}..={end_year} with no form filter; every form is kept"),
        }

        let mut report = BackfillReport {
            success: true,
            ..Default::default()
        };

        for year in start_year..=end_year {
            for quarter in 1..=4u32 {
                let label = format!("{year}-Q{quarter}");
                let text = match self.index.quarterly_index(year, quarter) {
                    Ok(Fetched::Found(t)) => t,
                    Ok(Fetched::Absent) => {
                        report.quarters_absent += 1;
                        continue;
                    }
                    Err(e) => {
                        error!("Fetching {label} failed: {e}; skipping quarter");
                        report.quarters_failed += 1;
                        report.success = false;
                        continue;
                    }
                };

                let parsed = match parse_master_index(&text, &label, forms) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Parsing {label} failed: {e}; skipping quarter");
                        report.quarters_failed += 1;
                        report.success = false;
                        continue;
                    }
                };

                match self.store_indexed(&parsed.filings) {
                    Ok(n) => {
                        info!("{label}: {n} of {} filings inserted", parsed.filings.len());
                        report.filings_inserted += n;
                        report.quarters_processed += 1;
                    }
                    Err(e) => {
                        error!("Storing {label} failed: {e}; skipping quarter");
                        report.quarters_failed += 1;
                        report.success = false;
                    }
                }
            }
        }

        info!(
            "Backfill {start_year}..={end_year} finished: {} filings inserted, {} quarters failed",
            report.filings_inserted, report.quarters_failed
        );
        report
    }
}
