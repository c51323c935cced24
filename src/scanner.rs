/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use scraper::{ElementRef, Html, Selector};

use crate::errors::ScanError;
use crate::fetchers::document::filing_dir_url;
use crate::fetchers::{Fetched, SecClient, decode_text};

const INDEX_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Exhibit types only asset-backed issuers file (servicing criteria, compliance statements).
pub const STRUCTURED_FINANCE_PREFIXES: [&str; 5] = ["EX-33", "EX-34", "EX-35", "EX-1122", "EX-1123"];

const TABLE_HEADING: &str = "document format files";

/// What a filing's index page says about its documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPageScan {
    pub primary_document: Option<String>,
    pub structured_finance: bool,
}

/// Resolves a filing's primary document from its `-index.html` page.
pub struct FilingIndexPageScanner {
    client: Arc<SecClient>,
    archive_base: String,
}

impl FilingIndexPageScanner {
    pub fn new(client: Arc<SecClient>, archive_base: &str) -> Self {
        Self {
            client,
            archive_base: archive_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn index_page_url(&self, entity_id: &str, accession_number: &str) -> String {
        format!(
            "{}/{accession_number}-index.html",
            filing_dir_url(&self.archive_base, entity_id, accession_number)
        )
    }

    /// A missing index page scans as "nothing found, not structured finance".
    pub fn scan(
        &self,
        entity_id: &str,
        accession_number: &str,
        forms: &BTreeSet<String>,
    ) -> Result<IndexPageScan, ScanError> {
        let url = self.index_page_url(entity_id, accession_number);
        let body = match self.client.get_bytes(&url, INDEX_PAGE_TIMEOUT, &[404]) {
            Ok(Fetched::Found(b)) => b,
            Ok(Fetched::Absent) => {
                warn!("Index page not found: {url}");
                return Ok(IndexPageScan {
                    primary_document: None,
                    structured_finance: false,
                });
            }
            Err(e) => return Err(ScanError::Fetch(e)),
        };
        let html = decode_text(&body);
        scan_index_page(&html, forms).ok_or(ScanError::NoDocumentTable { url })
    }
}

/// Scan index-page HTML. `None` when no document table can be located.
///
/// A structured-finance exhibit anywhere in the table wins over any primary
/// document already found.
pub fn scan_index_page(html: &str, forms: &BTreeSet<String>) -> Option<IndexPageScan> {
    let forms: BTreeSet<String> = forms.iter().map(|f| f.trim().to_ascii_uppercase()).collect();
    let doc = Html::parse_document(html);
    let table = find_document_table(&doc)?;

    let sel_tr = Selector::parse("tr").ok()?;
    let sel_td = Selector::parse("td").ok()?;
    let sel_a = Selector::parse("a[href]").ok()?;

    let mut primary = None;
    for row in table.select(&sel_tr).skip(1) {
        let cells: Vec<ElementRef> = row.select(&sel_td).collect();
        if cells.len() < 4 {
            continue;
        }
        let doc_type = norm_text(&cells[3].text().collect::<String>()).to_ascii_uppercase();

        if STRUCTURED_FINANCE_PREFIXES
            .iter()
            .any(|p| doc_type.starts_with(p))
        {
            debug!("structured-finance exhibit {doc_type} on index page");
            return Some(IndexPageScan {
                primary_document: None,
                structured_finance: true,
            });
        }

        if primary.is_none() && forms.contains(&doc_type) {
            let name_src = cells[2].select(&sel_a).next().unwrap_or(cells[2]);
            let name = norm_text(&name_src.text().collect::<String>());
            let lower = name.to_ascii_lowercase();
            if lower.ends_with(".htm") || lower.ends_with(".html") {
                primary = Some(name);
            }
        }
    }

    Some(IndexPageScan {
        primary_document: primary,
        structured_finance: false,
    })
}

/// `table.tableFile`, else the table after a "Document Format Files" heading,
/// else a table whose summary mentions it.
fn find_document_table(doc: &Html) -> Option<ElementRef<'_>> {
    let by_class = Selector::parse("table.tableFile").ok()?;
    if let Some(t) = doc.select(&by_class).next() {
        return Some(t);
    }

    let headings = Selector::parse("h2, div").ok()?;
    for h in doc.select(&headings) {
        // only the heading's own text, not its descendants
        let own: String = h
            .children()
            .filter_map(|c| c.value().as_text().map(|t| t.to_string()))
            .collect();
        if !own.to_ascii_lowercase().contains(TABLE_HEADING) {
            continue;
        }
        let next_table = h
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "table");
        if let Some(t) = next_table {
            return Some(t);
        }
    }

    let tables = Selector::parse("table[summary]").ok()?;
    doc.select(&tables).find(|t| {
        t.value()
            .attr("summary")
            .is_some_and(|s| s.to_ascii_lowercase().contains(TABLE_HEADING))
    })
}

/// Collapse whitespace & trim
fn norm_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
