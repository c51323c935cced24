/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;
use serde_json::Value;

use super::accession::is_canonical;
use crate::errors::ParseError;
use crate::models::{Entity, Filing};

static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^CIK(\d{10})\.json$").expect("static regex"));

/// One parsed submissions document.
#[derive(Debug, Default)]
pub struct SubmissionParse {
    pub entity: Option<Entity>,
    pub filings: Vec<Filing>,
    /// Filing rows skipped as malformed.
    pub errors: usize,
}

/// `CIK0000320193.json` -> `0000320193`
pub fn entity_id_from_file_name(name: &str) -> Option<String> {
    FILE_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse one bulk `CIK##########.json` file.
///
/// A file name without an id, an unreadable file or invalid JSON fail the whole
/// file; bad individual filing rows are only counted.
pub fn parse_file(path: &Path) -> Result<SubmissionParse, ParseError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let cik = entity_id_from_file_name(&name).ok_or(ParseError::BadFileName(name))?;

    let raw = fs::read(path)?;
    let root: Value = serde_json::from_slice(&raw)?;
    let parsed = parse_value(&cik, &root);
    if parsed.errors > 0 {
        warn!(
            "{} malformed filing rows in {}",
            parsed.errors,
            path.display()
        );
    }
    Ok(parsed)
}

/// Turn a submissions document (bulk file or per-entity endpoint, same shape)
/// into an entity and its recent filings.
pub fn parse_value(cik: &str, root: &Value) -> SubmissionParse {
    let Some(obj) = root.as_object() else {
        debug!("submissions document for {cik} is not an object");
        return SubmissionParse {
            errors: 1,
            ..Default::default()
        };
    };

    let name = [obj.get("entityName"), obj.get("name")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Entity {cik}"));

    let business = obj
        .get("addresses")
        .and_then(|a| a.get("business"))
        .filter(|b| b.is_object());
    let addr = |key: &str| business.and_then(|b| scalar_text(b.get(key)));

    let entity = Entity {
        id: cik.to_string(),
        name,
        sic: scalar_text(obj.get("sic")),
        sic_description: scalar_text(obj.get("sicDescription")),
        entity_type: scalar_text(obj.get("entityType")),
        insider_transaction_for_owner_exists: zero_one_flag(
            obj.get("insiderTransactionForOwnerExists"),
        ),
        insider_transaction_for_issuer_exists: zero_one_flag(
            obj.get("insiderTransactionForIssuerExists"),
        ),
        street1: addr("street1"),
        street2: addr("street2"),
        city: addr("city"),
        state_or_country: addr("stateOrCountry"),
        state_or_country_description: addr("stateOrCountryDescription"),
        zip_code: addr("zipCode"),
        phone: scalar_text(obj.get("phone")),
    };

    let (filings, errors) = match obj.get("filings").and_then(|f| f.get("recent")) {
        Some(recent) => recent_filings(cik, recent),
        None => (Vec::new(), 0),
    };

    SubmissionParse {
        entity: Some(entity),
        filings,
        errors,
    }
}

/* =================== recent filings =================== */

fn recent_filings(cik: &str, recent: &Value) -> (Vec<Filing>, usize) {
    let forms = arr_opt_str(recent.get("form"));
    let dates = arr_opt_str(recent.get("filingDate"));
    let accessions = arr_opt_str(recent.get("accessionNumber"));
    let documents = arr_opt_str(recent.get("primaryDocument"));

    let len = [forms.len(), dates.len(), accessions.len(), documents.len()]
        .into_iter()
        .min()
        .unwrap_or(0);

    let mut out = Vec::with_capacity(len);
    let mut errors = 0;
    for i in 0..len {
        let (Some(form), Some(date), Some(acc), Some(doc)) =
            (&forms[i], &dates[i], &accessions[i], &documents[i])
        else {
            debug!("missing value in filing row {i} for {cik}");
            errors += 1;
            continue;
        };
        let Ok(filing_date) = NaiveDate::parse_from_str(date, "%Y-%m-%d") else {
            debug!("bad filing date `{date}` in row {i} for {cik}");
            errors += 1;
            continue;
        };
        if !is_canonical(acc) {
            debug!("bad accession `{acc}` in row {i} for {cik}");
            errors += 1;
            continue;
        }
        out.push(Filing {
            accession_number: acc.clone(),
            entity_id: cik.to_string(),
            form_type: form.clone(),
            filing_date,
            primary_document: Some(doc.clone()),
        });
    }
    (out, errors)
}

/* =================== json helpers =================== */

/// Missing arrays become empty; non-string or empty entries become None.
fn arr_opt_str(v: Option<&Value>) -> Vec<Option<String>> {
    v.and_then(|x| x.as_array())
        .map(|a| {
            a.iter()
                .map(|x| {
                    x.as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Strings as-is (trimmed), numbers rendered; anything else is None.
fn scalar_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Only a literal 0 or 1 is trusted.
fn zero_one_flag(v: Option<&Value>) -> Option<bool> {
    match v?.as_i64()? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}
