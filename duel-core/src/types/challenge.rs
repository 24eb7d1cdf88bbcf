use serde::{Deserialize, Serialize};

use super::common::{Addr, MatchDuration, Micros, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Matched,
    Declined,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub from: Addr,
    pub to: Addr,
    pub duration: MatchDuration,
    pub bet: Micros,
    pub status: ChallengeStatus,
    pub created_at: TimestampMs,
    pub expires_at: TimestampMs,
    pub match_id: Option<String>,
}

impl Challenge {
    pub fn is_expired(&self, now: TimestampMs) -> bool {
        now > self.expires_at
    }
}
