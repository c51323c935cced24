/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};

use super::{Fetched, SecClient};
use crate::errors::FetchError;

const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Downloads individual filing documents from the archive.
pub struct DocumentFetcher {
    client: Arc<SecClient>,
    archive_base: String,
}

impl DocumentFetcher {
    /// `archive_base` is the `.../Archives/edgar/data` root.
    pub fn new(client: Arc<SecClient>, archive_base: &str) -> Self {
        Self {
            client,
            archive_base: archive_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn document_url(&self, entity_id: &str, accession_number: &str, filename: &str) -> String {
        format!(
            "{}/{}",
            filing_dir_url(&self.archive_base, entity_id, accession_number),
            filename
        )
    }

    /// Fetch one document into `dest`. A missing document is a quiet `false`;
/// an empty body is a failure and leaves `dest` untouched.
    pub fn download(
        &self,
        entity_id: &str,
        accession_number: &str,
        filename: &str,
        dest: &Path,
    ) -> bool {
        let url = self.document_url(entity_id, accession_number, filename);
        match self.fetch_to(&url, dest) {
            Ok(true) => {
                debug!("Saved {url} -> {}", dest.display());
                true
            }
            Ok(false) => {
                warn!("Document not found at {url}");
                false
            }
            Err(e) => {
                error!("Download of {url} failed: {e}");
                false
            }
        }
    }

    fn fetch_to(&self, url: &str, dest: &Path) -> Result<bool, FetchError> {
        let body = match self.client.get_bytes(url, DOCUMENT_TIMEOUT, &[404])? {
            Fetched::Found(b) => b,
            Fetched::Absent => return Ok(false),
        };
        if body.is_empty() {
            return Err(FetchError::Decode {
                url: url.to_string(),
                message: "empty document body".to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, body)?;
        Ok(true)
    }
}

/// `{archive}/{cik without leading zeros}/{accession without dashes}`
pub fn filing_dir_url(archive_base: &str, entity_id: &str, accession_number: &str) -> String {
    let cik = entity_id.trim_start_matches('0');
    let cik = if cik.is_empty() { "0" } else { cik };
    format!(
        "{}/{}/{}",
        archive_base.trim_end_matches('/'),
        cik,
        accession_number.replace('-', "")
    )
}
