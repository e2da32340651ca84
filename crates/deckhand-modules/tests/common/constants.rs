//! Test constants for deckhand-modules tests

#![allow(dead_code)]

use std::time::Duration;

/// Default test module id
pub const TEST_MODULE_ID: &str = "acme-projector";

/// Default test module version
pub const TEST_MODULE_VERSION: &str = "1.2.0";

/// Archive limit used by size cap tests
pub const SMALL_ARCHIVE_LIMIT: u64 = 1024;

/// Artificial latency of the mock store, long enough for refreshes to overlap
pub const MOCK_STORE_DELAY: Duration = Duration::from_millis(50);

/// How long to wait for a background refresh to settle
pub const SETTLE_TIME: Duration = Duration::from_millis(250);
