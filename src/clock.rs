//! Wall-clock helper.
//!
//! Every time-dependent operation takes an explicit `now_ms` argument. The
//! few wrappers without one read the clock here.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
