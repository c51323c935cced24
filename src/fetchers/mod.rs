/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderValue, USER_AGENT};

use crate::errors::FetchError;
use crate::pacer::RequestPacer;

pub mod bulk;
pub mod document;
pub mod index;
pub mod submissions;

pub use bulk::BulkArchiveFetcher;
pub use document::DocumentFetcher;
pub use index::MasterIndexFetcher;
pub use submissions::SubmissionsApiFetcher;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Outcome of a request whose target may legitimately not exist.
#[derive(Debug)]
pub enum Fetched<T> {
    Found(T),
    Absent,
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Found(v) => Fetched::Found(f(v)),
            Fetched::Absent => Fetched::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fetched::Absent)
    }
}

/// Blocking HTTP client shared by every fetcher. Each request first passes the pacer.
pub struct SecClient {
    http: Client,
    pacer: Arc<RequestPacer>,
}

impl SecClient {
    /// `user_agent` must include contact info, e.g. "acme-research ops@acme.example"
    pub fn new(user_agent: &str, pacer: Arc<RequestPacer>) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| FetchError::Client(format!("bad user agent: {e}")))?,
        );
        // reqwest is built without transparent decompression; gzip bodies are unpacked by hand
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { http, pacer })
    }

    /// Paced GET. Statuses listed in `absent` come back as `Fetched::Absent`,
    /// any other non-2xx is a `FetchError::Status`.
    pub fn get(
        &self,
        url: &str,
        timeout: Duration,
        absent: &[u16],
    ) -> Result<Fetched<Response>, FetchError> {
        self.send(self.http.get(url).timeout(timeout), url, absent)
    }

    /// Like `get`, but asks the server not to re-encode the body.
    pub fn get_identity(
        &self,
        url: &str,
        timeout: Duration,
        absent: &[u16],
    ) -> Result<Fetched<Response>, FetchError> {
        let req = self
            .http
            .get(url)
            .timeout(timeout)
            .header(ACCEPT_ENCODING, "identity");
        self.send(req, url, absent)
    }

    /// Paced GET of the whole body, gunzipped when it carries the gzip magic.
    pub fn get_bytes(
        &self,
        url: &str,
        timeout: Duration,
        absent: &[u16],
    ) -> Result<Fetched<Vec<u8>>, FetchError> {
        let resp = match self.get(url, timeout, absent)? {
            Fetched::Found(r) => r,
            Fetched::Absent => return Ok(Fetched::Absent),
        };
        let raw = resp
            .bytes()
            .map_err(|e| FetchError::from_reqwest(url, e))?
            .to_vec();
        Ok(Fetched::Found(maybe_gunzip(raw, url)))
    }

    fn send(
        &self,
        req: reqwest::blocking::RequestBuilder,
        url: &str,
        absent: &[u16],
    ) -> Result<Fetched<Response>, FetchError> {
        self.pacer.acquire();
        debug!("GET {url}");

        let resp = req.send().map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = resp.status();
        if absent.contains(&status.as_u16()) {
            debug!("{url} -> {status} (absent)");
            return Ok(Fetched::Absent);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Fetched::Found(resp))
    }
}

/* =================== body helpers =================== */

/// Decompress `raw` if it starts with the gzip magic; keep the raw bytes if that fails.
pub fn maybe_gunzip(raw: Vec<u8>, label: &str) -> Vec<u8> {
    if !raw.starts_with(&GZIP_MAGIC) {
        return raw;
    }
    let mut out = Vec::with_capacity(raw.len() * 4);
    match GzDecoder::new(raw.as_slice()).read_to_end(&mut out) {
        Ok(_) => out,
        Err(e) => {
            warn!("gzip magic present but decompression failed for {label}: {e}; keeping raw bytes");
            raw
        }
    }
}

/// UTF-8 first, Latin-1 as the fallback (every byte maps to a code point).
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
