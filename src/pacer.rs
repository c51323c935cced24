/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::ConfigError;

/// Minimum-interval gate in front of every outbound request.
///
/// One pacer is built per run and shared (behind an `Arc`) by every fetcher,
/// so the aggregate request rate stays bounded whichever pool is calling.
#[derive(Debug)]
pub struct RequestPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(interval: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "SEC_RATE_LIMIT_SECS",
                value: format!("{interval:?}"),
            });
        }
        Ok(Self {
            interval,
            last: Mutex::new(None),
        })
    }

    /// Block until `interval` has passed since the previous caller was let through.
    pub fn acquire(&self) {
        // A poisoned lock still holds a valid timestamp.
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}
