/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

pub mod accession;
pub mod master_index;
pub mod submissions;

pub use master_index::{MasterIndexParse, parse_master_index};
pub use submissions::SubmissionParse;
