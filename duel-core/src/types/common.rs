use serde::{Deserialize, Serialize};

/// Wallet address, used as the identity of a user everywhere in the system.
pub type Addr = String;

/// USD-denominated amount, in micros (1_000_000 micros == $1.00). Using a
/// fixed-point integer instead of a float means invariant checks like
/// `frozen <= total` are exact, never float-equality comparisons.
pub type Micros = i64;

/// Milliseconds since the Unix epoch, UTC.
pub type TimestampMs = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
    Sol,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Btc, Asset::Eth, Asset::Sol];
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::Sol => "SOL",
        };
        write!(f, "{s}")
    }
}

/// One of the enumerated match durations. Parsed to seconds deterministically
/// per spec §4.6 so that queue keys are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchDuration {
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
}

impl MatchDuration {
    pub const ALL: [MatchDuration; 5] = [
        MatchDuration::FiveMinutes,
        MatchDuration::FifteenMinutes,
        MatchDuration::OneHour,
        MatchDuration::FourHours,
        MatchDuration::TwentyFourHours,
    ];

    pub fn as_seconds(self) -> u64 {
        match self {
            MatchDuration::FiveMinutes => 5 * 60,
            MatchDuration::FifteenMinutes => 15 * 60,
            MatchDuration::OneHour => 60 * 60,
            MatchDuration::FourHours => 4 * 60 * 60,
            MatchDuration::TwentyFourHours => 24 * 60 * 60,
        }
    }

    pub fn as_millis(self) -> u64 {
        self.as_seconds() * 1000
    }
}

/// The enumerated bet sizes accepted by matchmaking, in USDC micros.
pub const ALLOWED_BETS_MICROS: [Micros; 5] =
    [5_000_000, 10_000_000, 25_000_000, 50_000_000, 100_000_000];

pub fn is_allowed_bet(bet: Micros) -> bool {
    ALLOWED_BETS_MICROS.contains(&bet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_seconds_are_deterministic() {
        assert_eq!(MatchDuration::FiveMinutes.as_seconds(), 300);
        assert_eq!(MatchDuration::TwentyFourHours.as_millis(), 86_400_000);
    }

    #[test]
    fn bet_allowlist_rejects_arbitrary_amounts() {
        assert!(is_allowed_bet(10_000_000));
        assert!(!is_allowed_bet(10_000_001));
    }
}
