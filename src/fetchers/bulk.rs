/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use super::{Fetched, SecClient};
use crate::errors::FetchError;

const BULK_TIMEOUT: Duration = Duration::from_secs(900);

/// Streams the nightly submissions archive to disk.
pub struct BulkArchiveFetcher {
    client: Arc<SecClient>,
}

impl BulkArchiveFetcher {
    pub fn new(client: Arc<SecClient>) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`. Returns false (and removes any partial file) on failure.
    pub fn download(&self, url: &str, dest: &Path) -> bool {
        info!("Downloading bulk archive {url} -> {}", dest.display());
        match self.stream_to(url, dest) {
            Ok(written) => {
                info!("Bulk archive saved ({written} bytes)");
                true
            }
            Err(e) => {
                error!("Bulk download of {url} failed: {e}");
                if dest.exists() {
                    if let Err(rm) = fs::remove_file(dest) {
                        warn!("Could not remove partial file {}: {rm}", dest.display());
                    }
                }
                false
            }
        }
    }

    fn stream_to(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut resp = match self.client.get_identity(url, BULK_TIMEOUT, &[])? {
            Fetched::Found(r) => r,
            // no status is treated as absent for the archive
            Fetched::Absent => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                });
            }
        };
        let expected = resp.content_length();

        let mut out = BufWriter::new(File::create(dest)?);
        let written = io::copy(&mut resp, &mut out).map_err(|e| {
            if e.kind() == io::ErrorKind::TimedOut {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Io(e)
            }
        })?;
        out.flush()?;

        if let Some(expected) = expected {
            if expected != written {
                warn!("Size mismatch for {url}: declared {expected}, wrote {written}");
            }
        }
        Ok(written)
    }
}
