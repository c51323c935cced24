/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{Fetched, SecClient};
use crate::errors::FetchError;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-entity submissions endpoint (`/submissions/CIK##########.json`).
pub struct SubmissionsApiFetcher {
    client: Arc<SecClient>,
    api_base: String,
}

impl SubmissionsApiFetcher {
    pub fn new(client: Arc<SecClient>, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, cik: &str) -> String {
        format!("{}/submissions/CIK{cik}.json", self.api_base)
    }

    /// An unknown CIK answers 404, which comes back as `Absent`.
    pub fn fetch(&self, cik: &str) -> Result<Fetched<Value>, FetchError> {
        let url = self.url(cik);
        match self.client.get_bytes(&url, API_TIMEOUT, &[404])? {
            Fetched::Absent => Ok(Fetched::Absent),
            Fetched::Found(body) => serde_json::from_slice(&body)
                .map(Fetched::Found)
                .map_err(|e| FetchError::Decode {
                    url,
                    message: e.to_string(),
                }),
        }
    }
}
