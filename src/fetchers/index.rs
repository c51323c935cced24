/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use log::{debug, info};

use super::{Fetched, SecClient, decode_text};
use crate::errors::FetchError;

const DAILY_TIMEOUT: Duration = Duration::from_secs(60);
const QUARTERLY_TIMEOUT: Duration = Duration::from_secs(180);

/// Weekends and holidays have no daily index; the archive answers 403 or 404.
const DAILY_ABSENT: &[u16] = &[403, 404];
const QUARTERLY_ABSENT: &[u16] = &[404];

/// Fetches the pipe-delimited master indices (daily and quarterly).
pub struct MasterIndexFetcher {
    client: Arc<SecClient>,
    base_url: String,
}

impl MasterIndexFetcher {
    pub fn new(client: Arc<SecClient>, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn daily_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/Archives/edgar/daily-index/{}/QTR{}/master.{}.idx",
            self.base_url,
            date.year(),
            quarter_of(date),
            date.format("%Y%m%d")
        )
    }

    pub fn quarterly_url(&self, year: i32, quarter: u32) -> String {
        format!(
            "{}/Archives/edgar/full-index/{year}/QTR{quarter}/master.gz",
            self.base_url
        )
    }

    pub fn daily_index(&self, date: NaiveDate) -> Result<Fetched<String>, FetchError> {
        let url = self.daily_url(date);
        let fetched = self.client.get_bytes(&url, DAILY_TIMEOUT, DAILY_ABSENT)?;
        if fetched.is_absent() {
            debug!("No daily index for {date} (weekend/holiday?)");
        }
        Ok(fetched.map(|b| decode_text(&b)))
    }

    /// The quarterly file is gzip on the wire; `get_bytes` inflates it in memory.
    pub fn quarterly_index(&self, year: i32, quarter: u32) -> Result<Fetched<String>, FetchError> {
        let url = self.quarterly_url(year, quarter);
        let fetched = self.client.get_bytes(&url, QUARTERLY_TIMEOUT, QUARTERLY_ABSENT)?;
        match &fetched {
            Fetched::Found(b) => info!("Fetched {year}-Q{quarter} index ({} bytes)", b.len()),
            Fetched::Absent => info!("No quarterly index for {year}-Q{quarter}"),
        }
        Ok(fetched.map(|b| decode_text(&b)))
    }
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}
