use serde::{Deserialize, Serialize};

use super::common::{Addr, Micros, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub total: Micros,
    pub frozen: Micros,
}

impl LedgerEntry {
    pub fn zero() -> Self {
        Self { total: 0, frozen: 0 }
    }

    pub fn available(&self) -> Micros {
        self.total - self.frozen
    }

    pub fn is_valid(&self) -> bool {
        self.total >= 0 && self.frozen >= 0 && self.frozen <= self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub total: Micros,
    pub frozen: Micros,
    pub available: Micros,
}

impl From<LedgerEntry> for BalanceView {
    fn from(e: LedgerEntry) -> Self {
        Self {
            total: e.total,
            frozen: e.frozen,
            available: e.available(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceEventKind {
    Deposit,
    Withdraw,
    MatchWin,
    MatchLoss,
    MatchTieRefund,
    RakeWithdrawal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEvent {
    pub id: String,
    pub owner: Addr,
    pub kind: BalanceEventKind,
    pub amount: Micros,
    pub signature: Option<String>,
    pub match_id: Option<String>,
    pub created_at: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_is_total_minus_frozen() {
        let e = LedgerEntry {
            total: 100,
            frozen: 40,
        };
        assert_eq!(e.available(), 60);
        assert!(e.is_valid());
    }

    #[test]
    fn over_frozen_entry_is_invalid() {
        let e = LedgerEntry {
            total: 10,
            frozen: 20,
        };
        assert!(!e.is_valid());
    }
}
