/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://www.sec.gov";
pub const DEFAULT_API_BASE_URL: &str = "https://data.sec.gov";
pub const DEFAULT_BULK_URL: &str =
    "https://www.sec.gov/Archives/edgar/daily-index/bulkdata/submissions.zip";

/// Runtime settings. Loaded from the process environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub user_agent: String,
    pub base_url: String,
    pub api_base_url: String,
    pub bulk_url: String,
    pub rate_limit: Duration,
    pub database_url: String,
    pub data_dir: PathBuf,
    pub doc_subdir: String,
    pub bulk_workers: usize,
    pub bulk_chunk_size: usize,
    pub download_threads: usize,
    pub incremental_days: u32,
    pub target_doc_forms: BTreeSet<String>,
    pub backfill_forms: Option<BTreeSet<String>>,
    pub excluded_sic_codes: Vec<String>,
    pub metadata_retries: u32,
    pub metadata_backoff_base: f64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; `from_env` plugs in the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let user_agent = get("SEC_USER_AGENT").ok_or(ConfigError::Missing("SEC_USER_AGENT"))?;

        let rate_secs: f64 = parse_or(get("SEC_RATE_LIMIT_SECS"), "SEC_RATE_LIMIT_SECS", 0.11)?;
        if !(rate_secs.is_finite() && rate_secs > 0.0) {
            return Err(ConfigError::Invalid {
                key: "SEC_RATE_LIMIT_SECS",
                value: rate_secs.to_string(),
            });
        }

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1);

        Ok(Settings {
            user_agent,
            base_url: get("SEC_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_base_url: get("SEC_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            bulk_url: get("SEC_BULK_URL").unwrap_or_else(|| DEFAULT_BULK_URL.to_string()),
            rate_limit: Duration::from_secs_f64(rate_secs),
            database_url: get("DATABASE_URL").unwrap_or_else(|| "data/edgar.sqlite".to_string()),
            data_dir: PathBuf::from(get("DATA_STORAGE_PATH").unwrap_or_else(|| "data".to_string())),
            doc_subdir: get("DOC_SUBDIR").unwrap_or_else(|| "filing_documents".to_string()),
            bulk_workers: parse_or::<usize>(get("BULK_WORKERS"), "BULK_WORKERS", default_workers)?
                .max(1),
            bulk_chunk_size: positive(
                parse_or(get("BULK_CHUNK_SIZE"), "BULK_CHUNK_SIZE", 50_000)?,
                "BULK_CHUNK_SIZE",
            )?,
            download_threads: positive(
                parse_or(get("DOWNLOAD_THREADS"), "DOWNLOAD_THREADS", 10)?,
                "DOWNLOAD_THREADS",
            )?,
            incremental_days: parse_or(get("INCREMENTAL_DAYS_CHECK"), "INCREMENTAL_DAYS_CHECK", 31)?,
            target_doc_forms: get("TARGET_DOC_FORMS")
                .map(|v| parse_form_list(&v))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| parse_form_list("10-K,10-K/A")),
            backfill_forms: get("BACKFILL_TARGET_FORMS")
                .map(|v| parse_form_list(&v))
                .filter(|s| !s.is_empty()),
            excluded_sic_codes: get("EXCLUDED_SIC_CODES")
                .map(|v| split_list(&v))
                .unwrap_or_else(|| vec!["6189".into(), "6722".into(), "6726".into()]),
            metadata_retries: parse_or(get("METADATA_RETRIES"), "METADATA_RETRIES", 2)?,
            metadata_backoff_base: parse_or(
                get("METADATA_BACKOFF_SECS"),
                "METADATA_BACKOFF_SECS",
                1.5,
            )?,
        })
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.data_dir.join("submissions")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join(&self.doc_subdir)
    }

    pub fn bulk_archive_path(&self) -> PathBuf {
        self.data_dir.join("submissions.zip")
    }

    pub fn archive_data_url(&self) -> String {
        format!("{}/Archives/edgar/data", self.base_url.trim_end_matches('/'))
    }
}

/// Comma separated form codes, trimmed and upper-cased.
pub fn parse_form_list(raw: &str) -> BTreeSet<String> {
    split_list(raw)
        .into_iter()
        .map(|s| s.to_ascii_uppercase())
        .collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T: FromStr>(
    raw: Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}

fn positive(n: usize, key: &'static str) -> Result<usize, ConfigError> {
    if n == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: n.to_string(),
        });
    }
    Ok(n)
}
