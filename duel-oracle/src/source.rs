use async_trait::async_trait;

use duel_core::types::PriceSnapshot;
use duel_core::Result;

/// A pluggable upstream price feed. Real deployments would implement this
/// against an exchange or aggregator API; `duel-oracle` ships only the
/// deterministic test double, per spec §4.1 (external collaborators are
/// out of scope for this engine).
#[async_trait]
pub trait PriceSourceT: Send + Sync {
    async fn fetch(&self) -> Result<PriceSnapshot>;
}

/// A fixed-walk synthetic feed for development and tests: each call nudges
/// the previous snapshot by a small deterministic step so staleness and
/// PnL math have something to chew on without a live network dependency.
pub struct SyntheticPriceSource {
    step: duel_core::types::Micros,
    clock: Box<dyn Fn() -> duel_core::types::TimestampMs + Send + Sync>,
}

impl SyntheticPriceSource {
    pub fn new(
        step: duel_core::types::Micros,
        clock: impl Fn() -> duel_core::types::TimestampMs + Send + Sync + 'static,
    ) -> Self {
        Self {
            step,
            clock: Box::new(clock),
        }
    }
}

#[async_trait]
impl PriceSourceT for SyntheticPriceSource {
    async fn fetch(&self) -> Result<PriceSnapshot> {
        let now = (self.clock)();
        // Deterministic walk keyed off the clock so repeated calls within
        // the same test produce a moving but reproducible series.
        let tick = (now / 1000) as i64;
        Ok(PriceSnapshot {
            btc: 60_000_000_000 + tick * self.step,
            eth: 3_000_000_000 + tick * self.step,
            sol: 150_000_000 + tick * self.step,
            timestamp: now,
        })
    }
}
