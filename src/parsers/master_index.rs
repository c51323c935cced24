/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{debug, info, warn};

use super::accession::extract_accession;
use crate::errors::ParseError;
use crate::models::{Filing, IndexedFiling};

const HEADERS: [&str; 2] = [
    "CIK|Company Name|Form Type|Date Filed|Filename",
    "CIK|Company Name|Form Type|Date Filed|File Name",
];

/// Per-source cap on logged malformed lines; the rest are only counted.
const LOGGED_LINE_ERRORS: usize = 5;

#[derive(Debug, Default)]
pub struct MasterIndexParse {
    pub filings: Vec<IndexedFiling>,
    /// Data lines rejected as malformed.
    pub errors: usize,
}

/// Parse a master index (daily or quarterly).
///
/// `forms` restricts the output to those form types (compared upper-cased).
/// Missing the header line plus its dashed separator is a hard error; a valid
/// index with no data lines parses to an empty list.
pub fn parse_master_index(
    text: &str,
    source_name: &str,
    forms: Option<&BTreeSet<String>>,
) -> Result<MasterIndexParse, ParseError> {
    let forms: Option<BTreeSet<String>> =
        forms.map(|f| f.iter().map(|s| s.trim().to_ascii_uppercase()).collect());

    let mut out = MasterIndexParse::default();
    let mut errs = LineErrors::new(source_name);
    let mut header_seen = false;
    let mut in_body = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if !in_body {
            if HEADERS.contains(&line) {
                header_seen = true;
            } else if header_seen && line.starts_with("---") {
                debug!("index header of {source_name} ends at line {line_no}");
                in_body = true;
            }
            continue;
        }

        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() != 5 {
            errs.record(
                line_no,
                &format!("expected 5 fields, got {}: {}", parts.len(), clip(line)),
            );
            continue;
        }

        let Some(cik) = normalize_cik(parts[0]) else {
            errs.record(line_no, &format!("bad CIK `{}`", parts[0].trim()));
            continue;
        };

        let form_type = parts[2].trim().to_ascii_uppercase();
        if let Some(f) = &forms {
            if !f.contains(&form_type) {
                continue;
            }
        }

        let date_raw = parts[3].trim();
        let Ok(filing_date) = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d") else {
            errs.record(line_no, &format!("bad date `{date_raw}`"));
            continue;
        };

        let path = parts[4].trim();
        let Some(accession_number) = extract_accession(path) else {
            errs.record(line_no, &format!("no accession number in `{path}`"));
            continue;
        };

        let primary_document = path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        out.filings.push(IndexedFiling {
            filing: Filing {
                accession_number,
                entity_id: cik,
                form_type,
                filing_date,
                primary_document,
            },
            company_name: parts[1].trim().to_string(),
        });
    }

    if !in_body {
        return Err(ParseError::MissingHeader {
            source_name: source_name.to_string(),
        });
    }

    out.errors = errs.count;
    info!(
        "Parsed index {source_name}: {} filings, {} bad lines",
        out.filings.len(),
        out.errors
    );
    Ok(out)
}

/// Index CIKs are unpadded; store them as 10 zero-padded digits.
pub fn normalize_cik(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() || s.len() > 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{s:0>10}"))
}

fn clip(line: &str) -> &str {
    match line.char_indices().nth(150) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}

struct LineErrors<'a> {
    source: &'a str,
    count: usize,
}

impl<'a> LineErrors<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, count: 0 }
    }

    fn record(&mut self, line_no: usize, msg: &str) {
        if self.count < LOGGED_LINE_ERRORS {
            warn!("Skipping line {line_no} of {}: {msg}", self.source);
        } else if self.count == LOGGED_LINE_ERRORS {
            warn!("Further malformed lines in {} suppressed", self.source);
        }
        self.count += 1;
    }
}
