use serde::{Deserialize, Serialize};

use super::common::{Addr, Asset, Micros, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    Sl,
    Tp,
    Liquidation,
    Partial,
    MatchEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub match_id: String,
    pub player_address: Addr,
    pub asset: Asset,
    pub is_long: bool,
    pub entry_price: Micros,
    pub size: Micros,
    pub leverage: u32,
    pub sl: Option<Micros>,
    pub tp: Option<Micros>,
    pub opened_at: TimestampMs,
    pub exit_price: Option<Micros>,
    pub pnl: Option<Micros>,
    pub closed_at: Option<TimestampMs>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// `[A-Za-z0-9_-]{1,64}` per spec §3/§4.10.
pub fn is_valid_position_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_id_charset_is_enforced() {
        assert!(is_valid_position_id("abc_123-XYZ"));
        assert!(!is_valid_position_id(""));
        assert!(!is_valid_position_id("has space"));
        assert!(!is_valid_position_id(&"a".repeat(65)));
    }
}
