//! Small helpers shared across components that don't deserve their own module.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current epoch seconds, used to stamp the `created` field of streaming chunks.
pub fn unix_timestamp() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
