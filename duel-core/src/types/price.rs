use serde::{Deserialize, Serialize};

use super::common::{Asset, Micros, TimestampMs};

/// A single-writer snapshot of the latest prices for all tradeable assets.
/// Readers always see a fully-formed snapshot, never a partial tear, because
/// updates replace the whole `Arc` atomically (see `duel-oracle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub btc: Micros,
    pub eth: Micros,
    pub sol: Micros,
    pub timestamp: TimestampMs,
}

impl PriceSnapshot {
    pub fn price_of(&self, asset: Asset) -> Micros {
        match asset {
            Asset::Btc => self.btc,
            Asset::Eth => self.eth,
            Asset::Sol => self.sol,
        }
    }

    pub fn is_stale(&self, now: TimestampMs, max_age_ms: u64) -> bool {
        now.saturating_sub(self.timestamp) > max_age_ms
    }
}
