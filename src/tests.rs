/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, BufRead, BufReader, Cursor, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;

use crate::config::Settings;
use crate::fetchers::{Fetched, MasterIndexFetcher, SecClient};
use crate::models::{Entity, Filing};
use crate::open_pool;
use crate::pacer::RequestPacer;
use crate::pipeline::Pipeline;
use crate::pipeline::bulk::list_submission_files;
use crate::pipeline::documents::DownloadOptions;
use crate::store::DownloadQuery;

/* =================== canned HTTP responder =================== */

type Routes = HashMap<String, (u16, Vec<u8>)>;

/// Tiny HTTP/1.1 responder: one thread per connection, canned bodies by path,
/// 404 for anything else.
struct StubServer {
    base: String,
}

impl StubServer {
    fn start(routes: Vec<(String, u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Routes> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path, (status, body)))
                .collect(),
        );

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let routes = Arc::clone(&routes);
                thread::spawn(move || {
                    let _ = respond(stream, &routes);
                });
            }
        });

        StubServer {
            base: format!("http://{addr}"),
        }
    }
}

fn respond(mut stream: TcpStream, routes: &Routes) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (status, body) = routes
        .get(path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));
    let reason = match status {
        200 => "OK",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(&body)?;
    stream.flush()
}

fn ok(path: &str, body: impl Into<Vec<u8>>) -> (String, u16, Vec<u8>) {
    (path.to_string(), 200, body.into())
}

fn status(path: &str, code: u16) -> (String, u16, Vec<u8>) {
    (path.to_string(), code, b"error".to_vec())
}

/* =================== fixtures =================== */

fn test_settings(base: &str, data: &Path) -> Settings {
    let data = data.display().to_string();
    Settings::from_lookup(|k| match k {
        "SEC_USER_AGENT" => Some("edgar-pipeline tests ops@example.com".to_string()),
        "SEC_BASE_URL" | "SEC_API_BASE_URL" => Some(base.to_string()),
        "SEC_BULK_URL" => Some(format!("{base}/bulk/submissions.zip")),
        "SEC_RATE_LIMIT_SECS" => Some("0.001".to_string()),
        "DATA_STORAGE_PATH" => Some(data.clone()),
        "BULK_WORKERS" => Some("2".to_string()),
        "METADATA_RETRIES" => Some("0".to_string()),
        _ => None,
    })
    .unwrap()
}

fn pipeline_with(settings: Settings, dir: &Path) -> Pipeline {
    let pool = open_pool(dir.join("edgar.sqlite").to_str().unwrap()).unwrap();
    Pipeline::new(settings, pool).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn master_index(rows: &[&str]) -> String {
    let mut s = String::from(
        "Description:           Master Index of EDGAR Dissemination Feed\n\
         Last Data Received:    November 8, 2024\n\
         \n\
         CIK|Company Name|Form Type|Date Filed|Filename\n\
         --------------------------------------------------------------------------------\n",
    );
    for r in rows {
        s.push_str(r);
        s.push('\n');
    }
    s
}

fn submissions_json(name: &str, filings: &[(&str, &str, &str, &str)]) -> String {
    json!({
        "entityType": "operating",
        "sic": "3571",
        "sicDescription": "Electronic Computers",
        "name": name,
        "insiderTransactionForOwnerExists": 1,
        "insiderTransactionForIssuerExists": 0,
        "addresses": { "business": { "city": "CUPERTINO", "stateOrCountry": "CA" } },
        "filings": { "recent": {
            "accessionNumber": filings.iter().map(|f| f.0).collect::<Vec<_>>(),
            "form": filings.iter().map(|f| f.1).collect::<Vec<_>>(),
            "filingDate": filings.iter().map(|f| f.2).collect::<Vec<_>>(),
            "primaryDocument": filings.iter().map(|f| f.3).collect::<Vec<_>>(),
        }}
    })
    .to_string()
}

fn write_submission(dir: &Path, n: u32) -> PathBuf {
    let cik = format!("{n:010}");
    let path = dir.join(format!("CIK{cik}.json"));
    let acc = format!("{cik}-24-000001");
    let body = submissions_json(
        &format!("Company {n}"),
        &[(acc.as_str(), "10-K", "2024-03-01", "annual.htm")],
    );
    fs::write(&path, body).unwrap();
    path
}

/* =================== bulk =================== */

#[test]
fn chunked_bulk_ingest_survives_a_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("submissions");
    fs::create_dir_all(&src).unwrap();
    for n in 1..=5 {
        write_submission(&src, n);
    }
    fs::write(src.join("CIK0000000004.json"), "{ \"name\": \"trunc").unwrap();

    let mut settings = test_settings("http://127.0.0.1:9", dir.path());
    settings.bulk_chunk_size = 2;
    let pipeline = pipeline_with(settings, dir.path());

    let files = list_submission_files(&src).unwrap();
    assert_eq!(files.len(), 5);
    let report = pipeline.ingest_submission_files(files.clone()).unwrap();

    assert!(report.success);
    assert_eq!(report.files_found, 5);
    assert_eq!(report.files_parsed, 4);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.chunks_committed, 3);
    assert_eq!(report.filings_inserted, 4);

    let ids: Vec<String> = (1..=5).map(|n| format!("{n:010}")).collect();
    let present = pipeline.companies().existing_keys(&ids).unwrap();
    let expected: std::collections::HashSet<String> =
        [1, 2, 3, 5].iter().map(|n| format!("{n:010}")).collect();
    assert_eq!(present, expected);

    // same input again: nothing new, nothing duplicated
    let again = pipeline.ingest_submission_files(files).unwrap();
    assert_eq!(again.filings_inserted, 0);
    assert_eq!(again.files_failed, 1);
    assert_eq!(pipeline.filings().count().unwrap(), 4);
}

#[test]
fn bulk_run_downloads_extracts_and_ingests() {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let opts = zip::write::FileOptions::default();
    zip.start_file("CIK0000320193.json", opts).unwrap();
    zip.write_all(
        submissions_json(
            "Apple Inc.",
            &[
                ("0000320193-24-000123", "10-K", "2024-11-01", "aapl-20240928.htm"),
                ("0000320193-24-000081", "10-Q", "2024-08-02", "aapl-20240629.htm"),
            ],
        )
        .as_bytes(),
    )
    .unwrap();
    zip.start_file("CIK0000000042.json", opts).unwrap();
    zip.write_all(submissions_json("Small Co", &[]).as_bytes()).unwrap();
    zip.start_file("CIK0000320193-submissions-001.json", opts).unwrap();
    zip.write_all(b"{\"accessionNumber\": []}").unwrap();
    let archive = zip.finish().unwrap().into_inner();

    let server = StubServer::start(vec![ok("/bulk/submissions.zip", archive)]);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());

    let report = pipeline.run_bulk(true, true, true).unwrap();
    assert!(report.success);
    assert_eq!(report.files_found, 2);
    assert_eq!(report.files_parsed, 2);
    assert_eq!(report.filings_inserted, 2);

    let apple = pipeline.companies().get("0000320193").unwrap().unwrap();
    assert_eq!(apple.name, "Apple Inc.");
    assert_eq!(apple.insider_transaction_for_owner_exists, Some(true));
}

#[test]
fn submission_listing_walks_nested_directories() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();
    write_submission(dir.path(), 2);
    write_submission(&nested, 1);
    fs::write(nested.join("CIK0000000001-submissions-001.json"), "{}").unwrap();
    fs::write(dir.path().join("README.txt"), "x").unwrap();
    fs::create_dir_all(dir.path().join("CIK0000000003.json")).unwrap();

    let files = list_submission_files(dir.path()).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["CIK0000000002.json", "CIK0000000001.json"]);
    assert!(files[1].starts_with(&nested));
}

#[test]
fn ingest_without_extracted_files_is_an_unsuccessful_report() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings("http://127.0.0.1:9", dir.path()), dir.path());

    let report = pipeline.run_bulk(false, false, true).unwrap();
    assert!(!report.success);
    assert_eq!(report.files_found, 0);
}

#[test]
fn failed_bulk_download_leaves_no_partial_file() {
    let server = StubServer::start(vec![status("/bulk/submissions.zip", 500)]);
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.base, dir.path());
    let zip_path = settings.bulk_archive_path();
    let pipeline = pipeline_with(settings, dir.path());

    let report = pipeline.run_bulk(true, true, true).unwrap();
    assert!(!report.success);
    assert!(!zip_path.exists());
}

/* =================== daily indices / incremental =================== */

const APPLE_10K: &str =
    "320193|Apple Inc.|10-K|2024-11-06|edgar/data/320193/0000320193-24-000123.txt";
const AMAZON_8K: &str =
    "1018724|AMAZON COM INC|8-K|2024-11-06|edgar/data/1018724/000101872424000190.txt";
const APPLE_4: &str =
    "320193|Apple Inc.|4|2024-11-08|edgar/data/320193/00003201932400012599.txt";

fn incremental_server() -> StubServer {
    StubServer::start(vec![
        status("/Archives/edgar/daily-index/2024/QTR4/master.20241105.idx", 404),
        ok(
            "/Archives/edgar/daily-index/2024/QTR4/master.20241106.idx",
            master_index(&[APPLE_10K, AMAZON_8K]),
        ),
        status("/Archives/edgar/daily-index/2024/QTR4/master.20241107.idx", 500),
        ok(
            "/Archives/edgar/daily-index/2024/QTR4/master.20241108.idx",
            master_index(&[APPLE_10K, APPLE_4]),
        ),
        ok(
            "/submissions/CIK0000320193.json",
            submissions_json("Apple Inc.", &[]),
        ),
    ])
}

#[test]
fn daily_index_absent_versus_error() {
    let server = incremental_server();
    let pacer = Arc::new(RequestPacer::new(std::time::Duration::from_millis(1)).unwrap());
    let client = Arc::new(SecClient::new("tests ops@example.com", pacer).unwrap());
    let fetcher = MasterIndexFetcher::new(client, &server.base);

    let weekend = NaiveDate::from_ymd_opt(2024, 11, 5).unwrap();
    assert!(fetcher.daily_index(weekend).unwrap().is_absent());

    let broken = NaiveDate::from_ymd_opt(2024, 11, 7).unwrap();
    let err = fetcher.daily_index(broken).unwrap_err();
    assert!(err.is_transient());

    let good = NaiveDate::from_ymd_opt(2024, 11, 6).unwrap();
    match fetcher.daily_index(good).unwrap() {
        Fetched::Found(text) => assert!(text.contains("AMAZON COM INC")),
        Fetched::Absent => panic!("expected an index"),
    }
}

#[test]
fn incremental_update_is_partial_and_idempotent() {
    let server = incremental_server();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());
    let last_day = NaiveDate::from_ymd_opt(2024, 11, 8).unwrap();

    let report = pipeline.run_incremental_until(4, last_day).unwrap();
    assert_eq!(report.days_checked, 4);
    assert_eq!(report.days_absent, 1);
    assert_eq!(report.days_failed, 1);
    assert_eq!(report.filings_seen, 3);
    assert_eq!(report.filings_inserted, 3);
    assert_eq!(report.entities_refreshed, 1);
    assert_eq!(report.entities_missing, 1);
    assert_eq!(report.entity_failures, 0);
    // the 500 day makes this a run with warnings
    assert!(!report.success);

    let apple = pipeline.companies().get("0000320193").unwrap().unwrap();
    assert_eq!(apple.sic.as_deref(), Some("3571"));
    // no metadata for this one: the index name placeholder stays
    let amazon = pipeline.companies().get("0001018724").unwrap().unwrap();
    assert_eq!(amazon.name, "AMAZON COM INC");
    assert_eq!(amazon.sic, None);

    let again = pipeline.run_incremental_until(4, last_day).unwrap();
    assert_eq!(again.filings_inserted, 0);
    assert_eq!(pipeline.filings().count().unwrap(), 3);
    assert_eq!(
        pipeline.companies().get("0000320193").unwrap().unwrap(),
        apple
    );
}

#[test]
fn unknown_entity_marks_incremental_run_with_warnings() {
    let server = incremental_server();
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());

    // one good day: Apple resolves, Amazon's metadata is a 404
    let day = NaiveDate::from_ymd_opt(2024, 11, 6).unwrap();
    let report = pipeline.run_incremental_until(1, day).unwrap();
    assert_eq!(report.days_failed, 0);
    assert_eq!(report.filings_inserted, 2);
    assert_eq!(report.entities_refreshed, 1);
    assert_eq!(report.entities_missing, 1);
    assert_eq!(report.entity_failures, 0);
    assert!(!report.success);
}

/* =================== backfill =================== */

#[test]
fn backfill_skips_bad_quarters_and_keeps_going() {
    let q1 = master_index(&[
        "320193|Apple Inc.|10-K|2023-02-03|edgar/data/320193/0000320193-23-000006.txt",
        "320193|Apple Inc.|8-K|2023-02-02|edgar/data/320193/0000320193-23-000005.txt",
    ]);
    let q4 = master_index(&[
        "1018724|AMAZON COM INC|10-k|2023-11-01|edgar/data/1018724/0001018724-23-000099.txt",
    ]);
    let server = StubServer::start(vec![
        ok("/Archives/edgar/full-index/2023/QTR1/master.gz", gzip(q1.as_bytes())),
        ok("/Archives/edgar/full-index/2023/QTR2/master.gz", "<html>maintenance</html>"),
        // QTR3 is not routed: 404
        // plain text where gzip is expected still parses
        ok("/Archives/edgar/full-index/2023/QTR4/master.gz", q4),
        status("/Archives/edgar/full-index/2024/QTR1/master.gz", 500),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());

    let forms: BTreeSet<String> = ["10-K".to_string()].into();
    let report = pipeline.run_backfill(2023, 2024, Some(&forms));

    assert_eq!(report.filings_inserted, 2);
    assert_eq!(report.quarters_processed, 2);
    // 2023-Q3 and 2024-Q2..Q4
    assert_eq!(report.quarters_absent, 4);
    // 2023-Q2 (not an index) and 2024-Q1 (500)
    assert_eq!(report.quarters_failed, 2);
    assert!(!report.success);

    let again = pipeline.run_backfill(2023, 2024, Some(&forms));
    assert_eq!(again.filings_inserted, 0);
    assert_eq!(pipeline.filings().count().unwrap(), 2);
}

/* =================== document download =================== */

fn index_page(rows: &str) -> String {
    format!(
        r#"<html><body><table class="tableFile" summary="Document Format Files">
        <tr><th>Seq</th><th>Description</th><th>Document</th><th>Type</th><th>Size</th></tr>
        {rows}
        </table></body></html>"#
    )
}

fn doc_row(name: &str, kind: &str) -> String {
    format!(r#"<tr><td>1</td><td>{kind}</td><td><a href="/x/{name}">{name}</a></td><td>{kind}</td><td>10</td></tr>"#)
}

fn filing(cik: &str, acc: &str) -> Filing {
    Filing {
        accession_number: acc.to_string(),
        entity_id: cik.to_string(),
        form_type: "10-K".to_string(),
        filing_date: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
        primary_document: None,
    }
}

#[test]
fn document_download_resolves_skips_and_counts() {
    let apple_dir = "/Archives/edgar/data/320193/000032019324000123";
    let abs_dir = "/Archives/edgar/data/42/000000004224000001";
    let gone_doc_dir = "/Archives/edgar/data/44/000000004424000003";
    let server = StubServer::start(vec![
        ok(
            &format!("{apple_dir}/0000320193-24-000123-index.html"),
            index_page(&(doc_row("aapl-20240928.htm", "10-K") + &doc_row("ex21.htm", "EX-21.1"))),
        ),
        ok(
            &format!("{apple_dir}/aapl-20240928.htm"),
            gzip(b"<html>annual report</html>"),
        ),
        ok(
            &format!("{abs_dir}/0000000042-24-000001-index.html"),
            index_page(&(doc_row("d10k.htm", "10-K") + &doc_row("ex1122.htm", "EX-1122"))),
        ),
        // 0000000043: no index page at all
        ok(
            &format!("{gone_doc_dir}/0000000044-24-000003-index.html"),
            index_page(&doc_row("missing.htm", "10-K")),
        ),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.base, dir.path());
    let docs_dir = settings.documents_dir();
    let pipeline = pipeline_with(settings, dir.path());

    let filings = vec![
        filing("0000320193", "0000320193-24-000123"),
        filing("0000000042", "0000000042-24-000001"),
        filing("0000000043", "0000000043-24-000002"),
        filing("0000000044", "0000000044-24-000003"),
    ];
    let opts = DownloadOptions {
        forms: ["10-K".to_string(), "10-K/A".to_string()].into(),
        workers: 3,
        max_downloads: None,
        skip_existing: true,
    };

    let report = pipeline.download_documents(&filings, &opts).unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped_structured_finance, 1);
    // structured finance + no index page + document 404
    assert_eq!(report.failed, 3);

    let saved = docs_dir.join("0000320193_000032019324000123_aapl-20240928.htm");
    assert_eq!(fs::read(&saved).unwrap(), b"<html>annual report</html>");

    let again = pipeline.download_documents(&filings, &opts).unwrap();
    assert_eq!(again.succeeded, 0);
    assert_eq!(again.skipped_existing, 1);
    assert_eq!(again.failed, 3);

    let capped = DownloadOptions {
        max_downloads: Some(1),
        skip_existing: false,
        ..opts
    };
    let report = pipeline.download_documents(&filings, &capped).unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
}

#[test]
fn structured_finance_only_batch_reports_failure() {
    let dir_path = "/Archives/edgar/data/42/000000004224000001";
    let server = StubServer::start(vec![ok(
        &format!("{dir_path}/0000000042-24-000001-index.html"),
        index_page(&doc_row("ex1122.htm", "EX-1122")),
    )]);
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());

    let opts = DownloadOptions {
        forms: ["10-K".to_string()].into(),
        workers: 1,
        max_downloads: None,
        skip_existing: true,
    };
    let report = pipeline
        .download_documents(&[filing("0000000042", "0000000042-24-000001")], &opts)
        .unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.skipped_structured_finance, 1);
    assert_eq!(report.failed, 1);
}

#[test]
fn empty_document_body_is_not_saved() {
    let dir_path = "/Archives/edgar/data/320193/000032019324000123";
    let server = StubServer::start(vec![
        ok(
            &format!("{dir_path}/0000320193-24-000123-index.html"),
            index_page(&doc_row("aapl-20240928.htm", "10-K")),
        ),
        ok(&format!("{dir_path}/aapl-20240928.htm"), Vec::new()),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&server.base, dir.path());
    let saved = settings
        .documents_dir()
        .join("0000320193_000032019324000123_aapl-20240928.htm");
    let pipeline = pipeline_with(settings, dir.path());

    let opts = DownloadOptions {
        forms: ["10-K".to_string()].into(),
        workers: 1,
        max_downloads: None,
        skip_existing: true,
    };
    let filings = [filing("0000320193", "0000320193-24-000123")];

    let report = pipeline.download_documents(&filings, &opts).unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 1);
    assert!(!saved.exists());

    // nothing on disk, so the next run tries again instead of skipping
    let again = pipeline.download_documents(&filings, &opts).unwrap();
    assert_eq!(again.skipped_existing, 0);
    assert_eq!(again.failed, 1);
}

#[test]
fn selection_feeds_document_download() {
    let dir = tempfile::tempdir().unwrap();
    // nothing is routed: every index page is a 404
    let server = StubServer::start(vec![]);
    let pipeline = pipeline_with(test_settings(&server.base, dir.path()), dir.path());

    let mut fund = Entity::stub("0000000002", "Some Trust");
    fund.sic = Some("6726".into());
    pipeline
        .companies()
        .upsert(&[Entity::stub("0000000001", "Operating Co"), fund])
        .unwrap();
    pipeline
        .filings()
        .insert_ignore(&[
            filing("0000000001", "0000000001-24-000001"),
            filing("0000000002", "0000000002-24-000001"),
        ])
        .unwrap();

    let settings = pipeline.settings();
    let query = DownloadQuery {
        forms: settings.target_doc_forms.clone(),
        excluded_sic: settings.excluded_sic_codes.clone(),
        ..Default::default()
    };
    let opts = DownloadOptions {
        forms: settings.target_doc_forms.clone(),
        workers: 2,
        max_downloads: None,
        skip_existing: true,
    };
    let report = pipeline.download_selected(&query, &opts).unwrap();
    // only the operating company is selected, and its index page is missing
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 0);
}
