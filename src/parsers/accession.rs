/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

//! Accession number recovery from free-form archive paths.
//!
//! Matchers are tried in order and the first hit wins:
//! 1. the canonical `NNNNNNNNNN-NN-NNNNNN` form anywhere in the text
//! 2. an unbroken 18-digit run, re-hyphenated
//! 3. an unbroken 20-digit run, first 18 digits re-hyphenated

use std::sync::LazyLock;

use regex::Regex;

static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10}-\d{2}-\d{6}").expect("static regex"));
static CANONICAL_EXACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}-\d{2}-\d{6}$").expect("static regex"));
static DIGITS_18: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{18}").expect("static regex"));
static DIGITS_20: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{20}").expect("static regex"));

/// One step of the fallback chain.
pub type AccessionMatcher = fn(&str) -> Option<String>;

/// The fallback chain, in the order it is applied.
pub const MATCHERS: [(&str, AccessionMatcher); 3] = [
    ("canonical", match_canonical),
    ("18 digits", match_18_digits),
    ("20 digits", match_20_digits),
];

pub fn match_canonical(text: &str) -> Option<String> {
    CANONICAL.find(text).map(|m| m.as_str().to_string())
}

pub fn match_18_digits(text: &str) -> Option<String> {
    DIGITS_18.find(text).map(|m| hyphenate(m.as_str()))
}

pub fn match_20_digits(text: &str) -> Option<String> {
    DIGITS_20.find(text).map(|m| hyphenate(&m.as_str()[..18]))
}

pub fn extract_accession(text: &str) -> Option<String> {
    MATCHERS.iter().find_map(|(_, m)| m(text))
}

pub fn is_canonical(accession: &str) -> bool {
    CANONICAL_EXACT.is_match(accession)
}

/// `digits` must be exactly 18 ASCII digits.
fn hyphenate(digits: &str) -> String {
    format!("{}-{}-{}", &digits[..10], &digits[10..12], &digits[12..18])
}
