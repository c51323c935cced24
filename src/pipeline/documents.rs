/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use log::{debug, error, info};
use unicode_normalization::UnicodeNormalization;

use super::pool::run_pool;
use super::{DownloadReport, Pipeline};
use crate::errors::PipelineError;
use crate::models::Filing;
use crate::store::DownloadQuery;

const MAX_FILENAME_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Form types whose row on the index page marks the primary document.
    pub forms: BTreeSet<String>,
    pub workers: usize,
    /// Stop preparing once this many downloads are queued.
    pub max_downloads: Option<usize>,
    pub skip_existing: bool,
}

struct DownloadTask {
    entity_id: String,
    accession_number: String,
    filename: String,
    dest: PathBuf,
}

impl Pipeline {
    /// Select filings from the store and download their primary documents.
    pub fn download_selected(
        &self,
        query: &DownloadQuery,
        opts: &DownloadOptions,
    ) -> Result<DownloadReport, PipelineError> {
        let filings = self.filings.find_for_download(query)?;
        info!("{} stored filings selected for download", filings.len());
        self.download_documents(&filings, opts)
    }

    /// Resolve, then fetch in parallel, the primary document of each filing.
    ///
    /// Resolution runs sequentially (it is paced anyway). Structured-finance
    /// filings are not downloaded; they count as failed and are also tallied
    /// in `skipped_structured_finance`.
    pub fn download_documents(
        &self,
        filings: &[Filing],
        opts: &DownloadOptions,
    ) -> Result<DownloadReport, PipelineError> {
        let docs_dir = self.settings.documents_dir();
        fs::create_dir_all(&docs_dir)?;
        info!(
            "Preparing downloads for {} filings ({} workers, forms {:?})",
            filings.len(),
            opts.workers,
            opts.forms
        );

        let mut report = DownloadReport::default();
        let mut tasks = Vec::new();
        for f in filings {
            if opts.max_downloads.is_some_and(|max| tasks.len() >= max) {
                info!("Reached max downloads ({}); stopping preparation", tasks.len());
                break;
            }

            let scan = match self.scanner.scan(&f.entity_id, &f.accession_number, &opts.forms) {
                Ok(s) => s,
                Err(e) => {
                    error!("Resolving {}/{} failed: {e}", f.entity_id, f.accession_number);
                    report.failed += 1;
                    continue;
                }
            };
            if scan.structured_finance {
                info!(
                    "Skipping {}/{}: structured-finance filing",
                    f.entity_id, f.accession_number
                );
                report.skipped_structured_finance += 1;
                report.failed += 1;
                continue;
            }
            let Some(filename) = scan.primary_document else {
                debug!("No primary document for {}/{}", f.entity_id, f.accession_number);
                report.failed += 1;
                continue;
            };

            let dest = docs_dir.join(document_file_name(&f.entity_id, &f.accession_number, &filename));
            if opts.skip_existing && dest.exists() {
                debug!("Already have {}", dest.display());
                report.skipped_existing += 1;
                continue;
            }
            tasks.push(DownloadTask {
                entity_id: f.entity_id.clone(),
                accession_number: f.accession_number.clone(),
                filename,
                dest,
            });
        }

        info!(
            "Prepared {} downloads ({} existing, {} structured finance, {} failed)",
            tasks.len(),
            report.skipped_existing,
            report.skipped_structured_finance,
            report.failed
        );

        let total = tasks.len();
        let mut done = 0usize;
        run_pool(
            tasks,
            opts.workers,
            |t: DownloadTask| {
                self.documents
                    .download(&t.entity_id, &t.accession_number, &t.filename, &t.dest)
            },
            |ok| {
                done += 1;
                if ok {
                    report.succeeded += 1;
                } else {
                    report.failed += 1;
                }
                if done % 100 == 0 || done == total {
                    info!(
                        "Download progress: {done}/{total} (ok {}, failed {})",
                        report.succeeded, report.failed
                    );
                }
            },
        )?;

        info!(
            "Document download finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        Ok(report)
    }
}

/// `{cik}_{accession without dashes}_{sanitized name}`
pub fn document_file_name(entity_id: &str, accession_number: &str, filename: &str) -> String {
    format!(
        "{entity_id}_{}_{}",
        accession_number.replace('-', ""),
        sanitize_filename(filename)
    )
}

/// Make a filename safe for local storage.
///
/// Names are NFKD-decomposed and what stays non-ASCII is dropped, anything outside word characters,
/// whitespace, `.` and `-` becomes `_`, runs of `_`/space collapse to one `_`,
/// and names over 200 characters are cut keeping their extension.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c.is_ascii_whitespace() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut in_run = false;
    for c in replaced.trim().chars() {
        if c == '_' || c == ' ' {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }

    if out.len() <= MAX_FILENAME_LEN {
        return out;
    }
    // ASCII only from here, so byte slicing is safe
    match out.rfind('.').filter(|&i| i > 0) {
        Some(dot) if out.len() - dot < MAX_FILENAME_LEN => {
            let ext = &out[dot..];
            format!("{}{}", &out[..MAX_FILENAME_LEN - ext.len()], ext)
        }
        _ => out[..MAX_FILENAME_LEN].to_string(),
    }
}
