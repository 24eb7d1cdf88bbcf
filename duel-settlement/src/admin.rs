use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{info, warn};

use duel_core::types::{ChallengeStatus, Match, MatchStatus, TimestampMs};
use duel_ledger::Ledger;
use duel_persistence::{ChallengeRepo, MatchRepo, PersistenceT};

use crate::settlement::Settlement;

/// §4.12's read-side stale-match check, used by `duel-server`'s "player's
/// active match" query rather than run as a background loop: a match past
/// its own deadline is reported as null without mutating anything, leaving
/// the actual cleanup to the settlement-retry loop.
pub fn active_match_is_stale(m: &Match, now: TimestampMs, active_stale_ms: u64, deposit_stale_ms: u64) -> bool {
    match m.status {
        MatchStatus::Active => now > m.end_time + active_stale_ms,
        MatchStatus::AwaitingDeposits => m
            .deposit_deadline
            .is_some_and(|deadline| now > deadline + deposit_stale_ms),
        _ => false,
    }
}

/// The two background admin sweeps from §4.12 (challenge expiry,
/// settlement retry), each its own `tokio::time::interval` task started
/// from `duel-server`'s composition root, following the usual
/// background-task spawn idiom: log-and-continue per item, never let one
/// bad item abort the loop.
pub struct AdminLoops {
    challenges: ChallengeRepo,
    matches: MatchRepo,
    ledger: Arc<Ledger>,
    settlement: Arc<Settlement>,
}

impl AdminLoops {
    pub fn new(store: Arc<dyn PersistenceT>, ledger: Arc<Ledger>, settlement: Arc<Settlement>) -> Self {
        Self {
            challenges: ChallengeRepo::new(store.clone()),
            matches: MatchRepo::new(store),
            ledger,
            settlement,
        }
    }

    pub async fn run_challenge_expiry_sweep(
        self: Arc<Self>,
        interval_ms: u64,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("Starting component: challenge expiry sweep");
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.sweep_expired_challenges().await,
            }
        }
        info!("Stopping component: challenge expiry sweep");
    }

    async fn sweep_expired_challenges(&self) {
        let now = duel_core::now_ms();
        let pending = match self.challenges.find_pending().await {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to list pending challenges: {}", e);
                return;
            }
        };
        for mut challenge in pending {
            if !challenge.is_expired(now) {
                continue;
            }
            if let Err(e) = self.ledger.unfreeze_balance(&challenge.from, challenge.bet).await {
                warn!("Failed to unfreeze expired challenge {}: {}", challenge.id, e);
                continue;
            }
            challenge.status = ChallengeStatus::Expired;
            if let Err(e) = self.challenges.set(&challenge).await {
                warn!("Failed to persist expired challenge {}: {}", challenge.id, e);
            }
        }
    }

    pub async fn run_settlement_retry_sweep(
        self: Arc<Self>,
        interval_ms: u64,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        info!("Starting component: settlement retry sweep");
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.sweep_unsettled_matches().await,
            }
        }
        info!("Stopping component: settlement retry sweep");
    }

    async fn sweep_unsettled_matches(&self) {
        for status in ["completed", "tied", "forfeited"] {
            let matches = match self.matches.find_by_status(status).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to list {} matches: {}", status, e);
                    continue;
                }
            };
            for m in matches {
                if m.on_chain_settled || m.on_chain_game_id.is_none() {
                    continue;
                }
                if let Err(e) = self.settlement.retry_onchain_settlement(&m.id).await {
                    warn!("Settlement retry deferred for {}: {}", m.id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_chain::{ChainT, MockChain};
    use duel_core::types::{Challenge, ChallengeStatus, MatchDuration};
    use duel_oracle::PriceOracle;
    use duel_persistence::InMemoryStore;
    use duel_position_engine::ClosingRegistry;
    use duel_session::SessionRegistry;

    fn admin(store: Arc<dyn PersistenceT>) -> AdminLoops {
        let ledger = Arc::new(Ledger::new(store.clone()));
        let chain: Arc<dyn ChainT> = Arc::new(MockChain::new());
        let settlement = Arc::new(Settlement::new(
            store.clone(),
            Arc::new(PriceOracle::new()),
            ledger.clone(),
            chain,
            ClosingRegistry::new(),
            SessionRegistry::new(),
            0.00001,
        ));
        AdminLoops::new(store, ledger, settlement)
    }

    #[test]
    fn active_match_past_end_time_plus_grace_is_stale() {
        let m = Match::new_active("m1".into(), "p1".into(), "p2".into(), MatchDuration::FiveMinutes, 1, 0);
        assert!(!active_match_is_stale(&m, m.end_time, 300_000, 300_000));
        assert!(active_match_is_stale(&m, m.end_time + 300_001, 300_000, 300_000));
    }

    #[tokio::test]
    async fn expired_challenge_is_marked_and_unfreezes_the_bet() {
        let store: Arc<dyn PersistenceT> = Arc::new(InMemoryStore::new());
        let admin = admin(store.clone());
        admin.ledger.credit(&"p1".to_string(), 10_000_000).await.unwrap();
        admin.ledger.freeze_for_match(&"p1".to_string(), 1_000_000).await.unwrap();

        let challenge = Challenge {
            id: "c1".into(),
            from: "p1".into(),
            to: "p2".into(),
            duration: MatchDuration::FiveMinutes,
            bet: 1_000_000,
            status: ChallengeStatus::Pending,
            created_at: 0,
            expires_at: 100,
            match_id: None,
        };
        ChallengeRepo::new(store.clone()).set(&challenge).await.unwrap();

        admin.sweep_expired_challenges().await;

        let updated = ChallengeRepo::new(store).get("c1").await.unwrap().unwrap();
        assert_eq!(updated.status, ChallengeStatus::Expired);
        assert_eq!(admin.ledger.balance_of(&"p1".to_string()).await.unwrap().frozen, 0);
    }
}
