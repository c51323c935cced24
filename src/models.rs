/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A registered filer, keyed by its zero-padded 10-digit CIK.
#[derive(Queryable, Insertable, Selectable)]
#[diesel(table_name = crate::schema::entities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_default_value = false)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub sic: Option<String>,
    pub sic_description: Option<String>,
    pub entity_type: Option<String>,
    pub insider_transaction_for_owner_exists: Option<bool>,
    pub insider_transaction_for_issuer_exists: Option<bool>,
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub state_or_country: Option<String>,
    pub state_or_country_description: Option<String>,
    pub zip_code: Option<String>,
    pub phone: Option<String>,
}

impl Entity {
    /// Placeholder row carrying only what a master index line knows about a filer.
    pub fn stub(id: impl Into<String>, name: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            name: name.into(),
            sic: None,
            sic_description: None,
            entity_type: None,
            insider_transaction_for_owner_exists: None,
            insider_transaction_for_issuer_exists: None,
            street1: None,
            street2: None,
            city: None,
            state_or_country: None,
            state_or_country_description: None,
            zip_code: None,
            phone: None,
        }
    }
}

/// One submission, keyed by accession number (`NNNNNNNNNN-NN-NNNNNN`).
#[derive(Queryable, Insertable, Selectable)]
#[diesel(table_name = crate::schema::filings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_default_value = false)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    pub accession_number: String,
    pub entity_id: String,
    pub form_type: String,
    pub filing_date: NaiveDate,
    pub primary_document: Option<String>,
}

/// A master index row: the filing plus the filer's display name from the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFiling {
    pub filing: Filing,
    pub company_name: String,
}
