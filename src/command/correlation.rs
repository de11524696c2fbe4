// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Correlation identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Payload key carrying the correlation identifier.
pub const CORRELATION_KEY: &str = "correlation_id";

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Generates a correlation identifier of the form `cmd_<secs>.<nanos>`.
///
/// Identifiers are built from the wall clock at nanosecond resolution and
/// are strictly increasing within the process, even when two calls land on
/// the same clock tick.
#[must_use]
pub fn next_correlation_id() -> String {
    let now = Utc::now()
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_default();
    let mut prev = LAST_STAMP.load(Ordering::Relaxed);
    let stamp = loop {
        let candidate = now.max(prev + 1);
        match LAST_STAMP.compare_exchange_weak(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => break candidate,
            Err(actual) => prev = actual,
        }
    };
    format!("cmd_{}.{:09}", stamp / 1_000_000_000, stamp % 1_000_000_000)
}
