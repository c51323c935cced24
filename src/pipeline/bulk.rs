/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use super::pool::run_pool;
use super::{BulkReport, Pipeline};
use crate::errors::PipelineError;
use crate::models::{Entity, Filing};
use crate::parsers::submissions::{entity_id_from_file_name, parse_file};

impl Pipeline {
    /// Download, extract and ingest the bulk submissions archive; each step can be skipped.
    ///
    /// A failed download or extraction, or an unreadable submissions
    /// directory, ends the run with `success == false`.
    /// A storage failure stops ingestion at the failing chunk and is returned as `Err`.
    pub fn run_bulk(
        &self,
        download: bool,
        extract: bool,
        ingest: bool,
    ) -> Result<BulkReport, PipelineError> {
        let zip_path = self.settings.bulk_archive_path();
        let target_dir = self.settings.submissions_dir();
        info!("Starting bulk load (download={download}, extract={extract}, ingest={ingest})");

        if download && !self.bulk.download(&self.settings.bulk_url, &zip_path) {
            error!("Bulk download failed; aborting bulk load");
            return Ok(BulkReport::default());
        }

        if extract {
            match extract_archive(&zip_path, &target_dir) {
                Ok(n) => info!("Extracted {n} entries into {}", target_dir.display()),
                Err(e) => {
                    error!("Extraction of {} failed: {e}", zip_path.display());
                    return Ok(BulkReport::default());
                }
            }
        }

        if !ingest {
            return Ok(BulkReport {
                success: true,
                ..Default::default()
            });
        }

        let files = match list_submission_files(&target_dir) {
            Ok(f) => f,
            Err(e) => {
                error!("Cannot list {}: {e}; nothing to ingest", target_dir.display());
                return Ok(BulkReport::default());
            }
        };
        self.ingest_submission_files(files)
    }

    /// Parse and store `files` chunk by chunk. Parsing within a chunk runs on
    /// the bulk worker pool; aggregation and the store writes happen here.
    pub fn ingest_submission_files(&self, files: Vec<PathBuf>) -> Result<BulkReport, PipelineError> {
        let chunk_size = self.settings.bulk_chunk_size.max(1);
        let workers = self.settings.bulk_workers;
        let total_chunks = files.len().div_ceil(chunk_size);
        let mut report = BulkReport {
            files_found: files.len(),
            ..Default::default()
        };
        info!(
            "Ingesting {} files in {total_chunks} chunks of up to {chunk_size} ({workers} workers)",
            files.len()
        );

        for (ci, chunk) in files.chunks(chunk_size).enumerate() {
            let chunk_no = ci + 1;
            let log_every = (chunk.len() / 5).max(1);

            // last record wins per entity id and per accession number
            let mut entities: HashMap<String, Entity> = HashMap::new();
            let mut filings: HashMap<String, Filing> = HashMap::new();
            let mut done = 0usize;

            run_pool(
                chunk.to_vec(),
                workers,
                |path: PathBuf| {
                    let res = parse_file(&path);
                    (path, res)
                },
                |(path, res)| {
                    done += 1;
                    match res {
                        Ok(parsed) => {
                            report.files_parsed += 1;
                            report.record_errors += parsed.errors;
                            if let Some(e) = parsed.entity {
                                entities.insert(e.id.clone(), e);
                            }
                            for f in parsed.filings {
                                filings.insert(f.accession_number.clone(), f);
                            }
                        }
                        Err(e) => {
                            report.files_failed += 1;
                            warn!("Skipping {}: {e}", path.display());
                        }
                    }
                    if done % log_every == 0 || done == chunk.len() {
                        info!("Chunk {chunk_no}/{total_chunks}: parsed {done}/{}", chunk.len());
                    }
                },
            )?;

            let entities: Vec<Entity> = entities.into_values().collect();
            let filings: Vec<Filing> = filings.into_values().collect();

            let affected = self.companies.upsert(&entities).inspect_err(|e| {
                error!("Entity upsert failed in chunk {chunk_no}: {e}; stopping bulk load");
            })?;
            let inserted = self.filings.insert_ignore(&filings).inspect_err(|e| {
                error!("Filing insert failed in chunk {chunk_no}: {e}; stopping bulk load");
            })?;

            report.entities_affected += affected;
            report.filings_inserted += inserted;
            report.chunks_committed += 1;
            info!(
                "Chunk {chunk_no}/{total_chunks} committed: {} entities, {inserted}/{} filings new",
                entities.len(),
                filings.len()
            );
        }

        report.success = true;
        info!(
            "Bulk ingest done: {} files parsed, {} failed, {} bad rows, {} filings inserted",
            report.files_parsed, report.files_failed, report.record_errors, report.filings_inserted
        );
        Ok(report)
    }
}

/// Unpack `zip_path` into `dest`, returning the number of entries.
pub fn extract_archive(zip_path: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let file = File::open(zip_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| PipelineError::Setup(format!("bad zip archive: {e}")))?;
    fs::create_dir_all(dest)?;
    let entries = archive.len();
    archive
        .extract(dest)
        .map_err(|e| PipelineError::Setup(format!("extracting archive: {e}")))?;
    Ok(entries)
}

/// Every `CIK##########.json` below `dir`, sorted so chunking is deterministic.
/// Supplementary `CIK##########-submissions-NNN.json` pages are not entity files and are skipped.
pub fn list_submission_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut out = Vec::new();
    let mut other = 0usize;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entity_id_from_file_name(&name).is_some() {
            out.push(entry.into_path());
        } else {
            other += 1;
        }
    }
    out.sort();
    if other > 0 {
        info!("Ignored {other} non-entity files under {}", dir.display());
    }
    Ok(out)
}
