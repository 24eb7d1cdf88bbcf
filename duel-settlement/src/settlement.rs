use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use duel_chain::{ChainT, EndGameParams};
use duel_core::constants::DEMO_BALANCE_MICROS;
use duel_core::types::{Addr, CloseReason, Match, MatchStatus, TimestampMs};
use duel_core::{Error, Result};
use duel_ledger::Ledger;
use duel_oracle::PriceOracle;
use duel_persistence::{MatchRepo, PersistenceT};
use duel_position_engine::{roi, ClosingRegistry, PositionEngine};
use duel_session::{ServerMessage, SessionRegistry};

/// Why a match is being finalised (§4.11 step 4: "forfeit if invoked from
/// forfeit path").
pub enum FinalizeReason {
    TimerExpired,
    Forfeit { forfeiting_player: Addr },
}

/// Runs the local, atomic part of settlement (§4.11 steps 1-7: freeze
/// prices, close remaining positions, compute ROI, decide outcome, persist,
/// pay out, broadcast) and the retriable on-chain part (steps 8-9),
/// serialised per match by a settlement mutex, the same per-key mutex
/// shape a transaction submitter uses to serialise operations per address.
pub struct Settlement {
    matches: MatchRepo,
    positions: PositionEngine,
    oracle: Arc<PriceOracle>,
    ledger: Arc<Ledger>,
    chain: Arc<dyn ChainT>,
    sessions: SessionRegistry,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    tie_eps: f64,
}

impl Settlement {
    pub fn new(
        store: Arc<dyn PersistenceT>,
        oracle: Arc<PriceOracle>,
        ledger: Arc<Ledger>,
        chain: Arc<dyn ChainT>,
        closing: ClosingRegistry,
        sessions: SessionRegistry,
        tie_eps: f64,
    ) -> Self {
        Self {
            matches: MatchRepo::new(store.clone()),
            positions: PositionEngine::new(store, closing),
            oracle,
            ledger,
            chain,
            sessions,
            locks: Mutex::new(HashMap::new()),
            tie_eps,
        }
    }

    async fn lock_for(&self, match_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .lock()
            .await
            .entry(match_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Steps 1-9 of §4.11. Idempotent: a match already in a terminal status
    /// is returned as-is without re-running payout, so a timer-fire racing
    /// a forfeit (or a retry of this same call) can't double-settle.
    pub async fn finalize_match(&self, match_id: &str, reason: FinalizeReason, now: TimestampMs) -> Result<Match> {
        let _guard = self.lock_for(match_id).await;

        let mut m = self
            .matches
            .get(match_id)
            .await?
            .ok_or_else(|| Error::MatchNotFound(match_id.to_string()))?;
        if m.status.is_terminal() {
            return Ok(m);
        }

        let frozen = self.oracle.snapshot().await;
        let open_positions = self.positions.open_positions_for_match(match_id).await?;
        for position in &open_positions {
            let price = frozen
                .map(|s| s.price_of(position.asset))
                .unwrap_or(position.entry_price);
            self.positions
                .close_position(&position.id, price, CloseReason::MatchEnd, now)
                .await?;
        }

        let all_positions = self.positions.all_positions_for_match(match_id).await?;
        let p1_pnl: duel_core::types::Micros = all_positions
            .iter()
            .filter(|p| p.player_address == m.player1)
            .filter_map(|p| p.pnl)
            .sum();
        let p2_pnl: duel_core::types::Micros = all_positions
            .iter()
            .filter(|p| p.player_address == m.player2)
            .filter_map(|p| p.pnl)
            .sum();
        let p1_roi = roi(p1_pnl, DEMO_BALANCE_MICROS);
        let p2_roi = roi(p2_pnl, DEMO_BALANCE_MICROS);

        let is_forfeit = matches!(reason, FinalizeReason::Forfeit { .. });
        let winner = match &reason {
            FinalizeReason::Forfeit { forfeiting_player } => m.other_player(forfeiting_player).cloned(),
            FinalizeReason::TimerExpired => {
                if (p1_roi - p2_roi).abs() < self.tie_eps {
                    None
                } else if p1_roi > p2_roi {
                    Some(m.player1.clone())
                } else {
                    Some(m.player2.clone())
                }
            }
        };

        m.status = if is_forfeit {
            MatchStatus::Forfeited
        } else if winner.is_none() {
            MatchStatus::Tied
        } else {
            MatchStatus::Completed
        };
        m.winner = winner.clone();
        m.player1_roi = Some(p1_roi);
        m.player2_roi = Some(p2_roi);
        m.settled_at = Some(now);
        self.matches.set(&m).await?;

        let rake = self
            .ledger
            .settle_match_payout(&m.player1, &m.player2, winner.as_ref(), m.bet_amount, match_id)
            .await?;
        info!("Settled match {} (rake={})", match_id, rake);

        self.sessions
            .broadcast_to_match_and_spectators(
                match_id,
                ServerMessage::MatchEnd {
                    match_id: match_id.to_string(),
                    winner: m.winner.clone(),
                    player1_roi: m.player1_roi,
                    player2_roi: m.player2_roi,
                },
            )
            .await;

        if m.on_chain_game_id.is_some() {
            self.settle_on_chain(&mut m).await;
        }

        Ok(m)
    }

    /// Steps 8-9: submit to chain and request payout. Never fails the
    /// caller — failures are logged and left for the settlement-retry
    /// admin loop (`retry_onchain_settlement`), per §4.11's "steps 8-9 are
    /// retriable and must be idempotent."
    async fn settle_on_chain(&self, m: &mut Match) {
        let Some(game_id) = m.on_chain_game_id.clone() else {
            return;
        };
        let p1_bps = roi_to_bps(m.player1_roi.unwrap_or(0.0));
        let p2_bps = roi_to_bps(m.player2_roi.unwrap_or(0.0));
        let is_forfeit = m.status == MatchStatus::Forfeited;

        match self
            .chain
            .end_game_on_chain(EndGameParams {
                game_id: game_id.clone(),
                winner: m.winner.clone(),
                player1_pnl_bps: p1_bps,
                player2_pnl_bps: p2_bps,
                is_forfeit,
            })
            .await
        {
            Ok(_sig) => {
                m.on_chain_settled = true;
                if let Err(e) = self.chain.process_match_payout(&m.id, m).await {
                    warn!("On-chain payout failed for {}: {}", m.id, e);
                }
            }
            Err(e) => {
                warn!("On-chain settlement failed for {}: {}", m.id, e);
            }
        }
        m.on_chain_retries += 1;
        let _ = self.matches.set(m).await;
    }

    /// Re-attempts the on-chain leg for a match already settled locally but
    /// not on-chain (§4.12's settlement-retry loop), skipping it until both
    /// player profiles exist on-chain (a recoverable precondition, not an
    /// error).
    pub async fn retry_onchain_settlement(&self, match_id: &str) -> Result<()> {
        let mut m = self
            .matches
            .get(match_id)
            .await?
            .ok_or_else(|| Error::MatchNotFound(match_id.to_string()))?;
        if !m.status.is_terminal() || m.on_chain_settled {
            return Ok(());
        }
        if !self.chain.player_profile_exists(&m.player1).await?
            || !self.chain.player_profile_exists(&m.player2).await?
        {
            return Err(Error::Recoverable("player profile missing on-chain".into()));
        }
        self.settle_on_chain(&mut m).await;
        Ok(())
    }
}

fn roi_to_bps(roi: f64) -> i64 {
    (roi * 10_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_chain::MockChain;
    use duel_core::types::{Asset, MatchDuration};
    use duel_persistence::InMemoryStore;

    fn settlement() -> (Settlement, Arc<dyn PersistenceT>, Arc<MockChain>) {
        let store: Arc<dyn PersistenceT> = Arc::new(InMemoryStore::new());
        let chain = Arc::new(MockChain::new());
        let s = Settlement::new(
            store.clone(),
            Arc::new(PriceOracle::new()),
            Arc::new(Ledger::new(store.clone())),
            chain.clone() as Arc<dyn ChainT>,
            ClosingRegistry::new(),
            SessionRegistry::new(),
            0.00001,
        );
        (s, store, chain)
    }

    async fn seed_match(store: &Arc<dyn PersistenceT>, ledger: &Ledger, id: &str, p1: &str, p2: &str, bet: i64) {
        let m = Match::new_active(id.into(), p1.into(), p2.into(), MatchDuration::FiveMinutes, bet, 0);
        MatchRepo::new(store.clone()).set(&m).await.unwrap();
        ledger.credit(&p1.to_string(), 10_000_000).await.unwrap();
        ledger.credit(&p2.to_string(), 10_000_000).await.unwrap();
        ledger.freeze_for_match(&p1.to_string(), bet).await.unwrap();
        ledger.freeze_for_match(&p2.to_string(), bet).await.unwrap();
    }

    #[tokio::test]
    async fn finalize_on_timer_picks_higher_roi_as_winner() {
        let (s, store, _chain) = settlement();
        let ledger = Ledger::new(store.clone());
        seed_match(&store, &ledger, "m1", "p1", "p2", 1_000_000).await;

        let engine = PositionEngine::new(store.clone(), ClosingRegistry::new());
        engine
            .open_position("pos1".into(), "m1".into(), "p1".into(), Asset::Btc, true, 100_000_000, 1_000_000, 10, None, None, 0)
            .await
            .unwrap();
        engine
            .close_position("pos1", 110_000_000, CloseReason::Manual, 100)
            .await
            .unwrap();

        let m = s.finalize_match("m1", FinalizeReason::TimerExpired, 1_000).await.unwrap();
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(m.winner, Some("p1".to_string()));
    }

    #[tokio::test]
    async fn finalize_on_forfeit_always_awards_the_survivor() {
        let (s, store, _chain) = settlement();
        let ledger = Ledger::new(store.clone());
        seed_match(&store, &ledger, "m1", "p1", "p2", 1_000_000).await;

        let m = s
            .finalize_match(
                "m1",
                FinalizeReason::Forfeit { forfeiting_player: "p1".into() },
                1_000,
            )
            .await
            .unwrap();
        assert_eq!(m.status, MatchStatus::Forfeited);
        assert_eq!(m.winner, Some("p2".to_string()));
    }

    #[tokio::test]
    async fn finalizing_an_already_terminal_match_is_idempotent() {
        let (s, store, _chain) = settlement();
        let ledger = Ledger::new(store.clone());
        seed_match(&store, &ledger, "m1", "p1", "p2", 1_000_000).await;

        s.finalize_match("m1", FinalizeReason::TimerExpired, 1_000).await.unwrap();
        let balance_after_first = ledger.balance_of(&"p1".to_string()).await.unwrap();

        let m = s.finalize_match("m1", FinalizeReason::TimerExpired, 2_000).await.unwrap();
        let balance_after_second = ledger.balance_of(&"p1".to_string()).await.unwrap();
        assert_eq!(m.settled_at, Some(1_000));
        assert_eq!(balance_after_first, balance_after_second);
    }
}
