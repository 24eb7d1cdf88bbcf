use serde::{Deserialize, Serialize};

use super::common::{Addr, MatchDuration, Micros, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    AwaitingDeposits,
    Active,
    Completed,
    Tied,
    Forfeited,
    Cancelled,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchStatus::Completed
                | MatchStatus::Tied
                | MatchStatus::Forfeited
                | MatchStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub player1: Addr,
    pub player2: Addr,
    pub duration: MatchDuration,
    pub bet_amount: Micros,
    pub status: MatchStatus,
    pub start_time: TimestampMs,
    pub end_time: TimestampMs,
    pub deposit_deadline: Option<TimestampMs>,
    pub on_chain_game_id: Option<String>,
    pub winner: Option<Addr>,
    pub player1_roi: Option<f64>,
    pub player2_roi: Option<f64>,
    pub on_chain_settled: bool,
    pub on_chain_retries: u32,
    pub settled_at: Option<TimestampMs>,
}

impl Match {
    pub fn new_active(
        id: String,
        player1: Addr,
        player2: Addr,
        duration: MatchDuration,
        bet_amount: Micros,
        start_time: TimestampMs,
    ) -> Self {
        Self {
            id,
            player1,
            player2,
            duration,
            bet_amount,
            status: MatchStatus::Active,
            start_time,
            end_time: start_time + duration.as_millis(),
            deposit_deadline: None,
            on_chain_game_id: None,
            winner: None,
            player1_roi: None,
            player2_roi: None,
            on_chain_settled: false,
            on_chain_retries: 0,
            settled_at: None,
        }
    }

    pub fn other_player(&self, who: &str) -> Option<&Addr> {
        if self.player1 == who {
            Some(&self.player2)
        } else if self.player2 == who {
            Some(&self.player1)
        } else {
            None
        }
    }

    pub fn has_player(&self, addr: &str) -> bool {
        self.player1 == addr || self.player2 == addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_time_is_start_plus_duration() {
        let m = Match::new_active(
            "m1".into(),
            "p1".into(),
            "p2".into(),
            MatchDuration::FiveMinutes,
            10_000_000,
            1_000,
        );
        assert_eq!(m.end_time, 1_000 + 300_000);
    }

    #[test]
    fn winner_is_null_only_for_tie_or_cancel_invariant_holds_structurally() {
        // The type itself allows any combination; the invariant is enforced
        // by the settlement code path (duel-settlement), not the type.
        let m = Match::new_active(
            "m1".into(),
            "p1".into(),
            "p2".into(),
            MatchDuration::FiveMinutes,
            10_000_000,
            0,
        );
        assert!(m.winner.is_none());
        assert!(!m.status.is_terminal());
    }
}
