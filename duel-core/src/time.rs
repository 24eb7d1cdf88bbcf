use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::TimestampMs;

/// Milliseconds since the Unix epoch, UTC. The one place this crate
/// reaches for a wall clock directly; everything downstream takes `now`
/// as a parameter so it stays testable.
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as TimestampMs
}
