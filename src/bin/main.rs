/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

extern crate edgar_pipeline;

use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use log::{error, info};

use edgar_pipeline::config::{Settings, parse_form_list};
use edgar_pipeline::open_pool;
use edgar_pipeline::pipeline::Pipeline;
use edgar_pipeline::pipeline::documents::DownloadOptions;
use edgar_pipeline::store::DownloadQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Download, extract and ingest the bulk submissions archive
    Bulk,
    /// Process the most recent daily indices
    Incremental,
    /// Process quarterly indices for a range of years
    Backfill,
    /// Download primary documents of stored filings
    DownloadDocs,
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Filing metadata acquisition and document download")]
struct Args {
    /// Pipeline execution mode
    #[arg(long, value_enum)]
    mode: Mode,

    /// sqlite database file (defaults to DATABASE_URL)
    #[arg(long)]
    db: Option<String>,

    /// [bulk] Skip downloading the archive
    #[arg(long)]
    skip_download: bool,

    /// [bulk] Skip extracting the archive
    #[arg(long)]
    skip_extract: bool,

    /// [bulk] Skip ingesting the extracted files
    #[arg(long)]
    skip_ingest: bool,

    /// [incremental] Number of past days to check (defaults to INCREMENTAL_DAYS_CHECK)
    #[arg(long, value_name = "N")]
    days_back: Option<u32>,

    /// [backfill] First year (inclusive)
    #[arg(long, value_name = "YYYY")]
    start_year: Option<i32>,

    /// [backfill] Last year (inclusive)
    #[arg(long, value_name = "YYYY")]
    end_year: Option<i32>,

    /// [backfill] Comma separated forms to keep (defaults to BACKFILL_TARGET_FORMS, else all)
    #[arg(long, value_name = "FORM1,FORM2")]
    backfill_forms: Option<String>,

    /// [download-docs] Comma separated target forms (defaults to TARGET_DOC_FORMS)
    #[arg(long, value_name = "FORM1,FORM2")]
    download_forms: Option<String>,

    /// [download-docs] Earliest filing date
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    download_start_date: Option<NaiveDate>,

    /// [download-docs] Latest filing date
    #[arg(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    download_end_date: Option<NaiveDate>,

    /// [download-docs] Max filings to select from the database
    #[arg(long, value_name = "N")]
    limit: Option<i64>,

    /// [download-docs] Max documents to download in this run
    #[arg(long, value_name = "N")]
    max_downloads: Option<usize>,

    /// [download-docs] Parallel download threads (defaults to DOWNLOAD_THREADS)
    #[arg(long, value_name = "T")]
    download_threads: Option<usize>,

    /// [download-docs] Download even if the local file exists
    #[arg(long)]
    no_skip_existing: bool,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("`{s}` is not YYYY-MM-DD: {e}"))
}

fn main() -> ExitCode {
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    info!("Running in {:?} mode", args.mode);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("{:?} run completed with failures", args.mode);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let settings = Settings::from_env().context("loading settings")?;
    let db_path = args.db.clone().unwrap_or_else(|| settings.database_url.clone());
    let pool = open_pool(&db_path).with_context(|| format!("opening database {db_path}"))?;
    let pipeline = Pipeline::new(settings, pool).context("building pipeline")?;
    let settings = pipeline.settings();

    match args.mode {
        Mode::Bulk => {
            let report = pipeline.run_bulk(!args.skip_download, !args.skip_extract, !args.skip_ingest)?;
            info!("Bulk report: {}", serde_json::to_string(&report)?);
            Ok(report.success)
        }
        Mode::Incremental => {
            let days = args.days_back.unwrap_or(settings.incremental_days);
            let report = pipeline.run_incremental(days)?;
            info!("Incremental report: {}", serde_json::to_string(&report)?);
            Ok(report.success)
        }
        Mode::Backfill => {
            let (Some(start), Some(end)) = (args.start_year, args.end_year) else {
                bail!("--start-year and --end-year are required for backfill");
            };
            let forms = args
                .backfill_forms
                .as_deref()
                .map(parse_form_list)
                .filter(|f| !f.is_empty());
            let report = pipeline.run_backfill(start, end, forms.as_ref());
            info!("Backfill report: {}", serde_json::to_string(&report)?);
            Ok(report.success)
        }
        Mode::DownloadDocs => {
            let forms = match args.download_forms.as_deref() {
                Some(raw) => parse_form_list(raw),
                None => settings.target_doc_forms.clone(),
            };
            if forms.is_empty() {
                bail!("no valid target forms given for download");
            }
            let query = DownloadQuery {
                forms: forms.clone(),
                start_date: args.download_start_date,
                end_date: args.download_end_date,
                excluded_sic: settings.excluded_sic_codes.clone(),
                limit: args.limit,
            };
            let opts = DownloadOptions {
                forms,
                workers: args.download_threads.unwrap_or(settings.download_threads).max(1),
                max_downloads: args.max_downloads,
                skip_existing: !args.no_skip_existing,
            };
            let report = pipeline.download_selected(&query, &opts)?;
            info!("Download report: {}", serde_json::to_string(&report)?);
            Ok(report.failed == 0)
        }
    }
}
