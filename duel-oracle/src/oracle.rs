use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};

use duel_core::constants::PRICE_MAX_AGE_MS;
use duel_core::types::{Asset, PriceSnapshot, TimestampMs};
use duel_core::error::Error;
use duel_core::Result;

use crate::source::PriceSourceT;

/// Holds the latest price snapshot behind a single writer. Readers get a
/// fully-formed `PriceSnapshot` copy, never a partial tear, because the
/// whole struct is replaced on each update.
pub struct PriceOracle {
    latest: RwLock<Option<PriceSnapshot>>,
}

impl PriceOracle {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(None),
        }
    }

    pub async fn snapshot(&self) -> Option<PriceSnapshot> {
        *self.latest.read().await
    }

    /// Reads the current price of `asset`, failing with `PriceStale` if no
    /// snapshot exists yet or the last one is older than `max_age_ms`.
    pub async fn price_of(&self, asset: Asset, now: TimestampMs, max_age_ms: u64) -> Result<duel_core::types::Micros> {
        match *self.latest.read().await {
            Some(snap) if !snap.is_stale(now, max_age_ms) => Ok(snap.price_of(asset)),
            _ => Err(Error::PriceStale),
        }
    }

    async fn set(&self, snap: PriceSnapshot) {
        *self.latest.write().await = Some(snap);
    }
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `source` on `interval_ms` cadence and publishes into `oracle`
/// until `shutdown` fires. Follows the usual component run-loop shape
/// (`select!` over a shutdown signal and a timer/stream tick, logging a
/// start line and warning on per-tick failure without aborting the loop).
pub async fn run_price_feed(
    oracle: Arc<PriceOracle>,
    source: Arc<dyn PriceSourceT>,
    interval_ms: u64,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Starting component: price oracle feed");
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                break;
            }
            _ = ticker.tick() => {
                match source.fetch().await {
                    Ok(snap) => oracle.set(snap).await,
                    Err(e) => warn!("Failed to fetch price snapshot: {}", e),
                }
            }
        }
    }
    info!("Stopping component: price oracle feed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SyntheticPriceSource;

    #[tokio::test]
    async fn price_of_fails_before_first_snapshot() {
        let oracle = PriceOracle::new();
        let err = oracle.price_of(Asset::Btc, 1_000, PRICE_MAX_AGE_MS).await;
        assert!(matches!(err, Err(Error::PriceStale)));
    }

    #[tokio::test]
    async fn price_of_fails_when_snapshot_is_old() {
        let oracle = PriceOracle::new();
        oracle
            .set(PriceSnapshot {
                btc: 1,
                eth: 1,
                sol: 1,
                timestamp: 0,
            })
            .await;
        let err = oracle.price_of(Asset::Btc, 20_000, 10_000).await;
        assert!(matches!(err, Err(Error::PriceStale)));
    }

    #[tokio::test]
    async fn run_price_feed_publishes_until_shutdown() {
        let oracle = Arc::new(PriceOracle::new());
        let source: Arc<dyn PriceSourceT> = Arc::new(SyntheticPriceSource::new(1, || 5_000));
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(run_price_feed(oracle.clone(), source, 5, rx));

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert!(oracle.snapshot().await.is_some());
    }
}
