use serde::{Deserialize, Serialize};

use super::common::{Addr, MatchDuration, Micros, TimestampMs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub player: Addr,
    pub duration: MatchDuration,
    pub bet: Micros,
    pub elo_rating: Option<i32>,
    pub enqueued_at: TimestampMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct QueueKey {
    pub duration_secs: u64,
    pub bet: Micros,
}

impl QueueKey {
    pub fn new(duration: MatchDuration, bet: Micros) -> Self {
        Self {
            duration_secs: duration.as_seconds(),
            bet,
        }
    }
}
