use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use duel_core::types::{Addr, Match, MatchDuration, Micros, QueueEntry, QueueKey, TimestampMs};
use duel_core::Result;
use duel_ledger::Ledger;
use duel_persistence::{MatchRepo, PersistenceT, QueueRepo};

pub enum JoinQueueOutcome {
    /// No opponent was waiting; the caller is now queued.
    Queued,
    /// An opposing entry was found and removed; a new active match was
    /// created and persisted.
    Matched { opponent: QueueEntry, new_match: Match },
}

/// Queue admission and FIFO pairing (§4.6). Queues are keyed by
/// `(duration, bet)`; admission freezes the bet before queuing so a
/// player can never be matched without covering their stake.
pub struct Matchmaking {
    store: Arc<dyn PersistenceT>,
    queues: QueueRepo,
    matches: MatchRepo,
    ledger: Arc<Ledger>,
    locks: Mutex<HashMap<QueueKey, Arc<Mutex<()>>>>,
}

impl Matchmaking {
    pub fn new(store: Arc<dyn PersistenceT>, ledger: Arc<Ledger>) -> Self {
        Self {
            queues: QueueRepo::new(store.clone()),
            matches: MatchRepo::new(store.clone()),
            store,
            ledger,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, key: QueueKey) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .lock()
            .await
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Admission per §4.6: validate, freeze the bet, then pair or queue
    /// within a queue-exclusive critical section.
    pub async fn join_queue(
        &self,
        player: Addr,
        elo_rating: Option<i32>,
        duration: MatchDuration,
        bet: Micros,
        now: TimestampMs,
    ) -> Result<JoinQueueOutcome> {
        if !self.ledger.freeze_for_match(&player, bet).await? {
            return Err(duel_core::error::Error::InsufficientBalance);
        }

        let key = QueueKey::new(duration, bet);
        let _guard = self.lock_for(key).await;

        let waiting = self.queues.list(key.duration_secs, key.bet).await?;
        let opponent = waiting.into_iter().filter(|e| e.player != player).min_by_key(|e| e.enqueued_at);

        match opponent {
            Some(opponent) => {
                self.queues
                    .remove(key.duration_secs, key.bet, &opponent.player)
                    .await?;

                let id = self.store.push("matches", Value::Null).await?;
                let new_match = Match::new_active(id, opponent.player.clone(), player, duration, bet, now);
                self.matches.set(&new_match).await?;

                info!(
                    "Matched {} vs {} for {}/{}",
                    new_match.player1, new_match.player2, key.duration_secs, key.bet
                );

                Ok(JoinQueueOutcome::Matched { opponent, new_match })
            }
            None => {
                let entry = QueueEntry {
                    player: player.clone(),
                    duration,
                    bet,
                    elo_rating,
                    enqueued_at: now,
                };
                self.queues.insert(key.duration_secs, key.bet, &entry).await?;
                Ok(JoinQueueOutcome::Queued)
            }
        }
    }

    pub async fn leave_queue(&self, player: &Addr, duration: MatchDuration, bet: Micros) -> Result<()> {
        let key = QueueKey::new(duration, bet);
        let _guard = self.lock_for(key).await;
        self.queues.remove(key.duration_secs, key.bet, player).await?;
        self.ledger.unfreeze_balance(player, bet).await
    }

    /// Called on final-connection disconnect; scans every known
    /// `(duration, bet)` combination for an entry belonging to `player`.
    pub async fn remove_from_all_queues(&self, player: &Addr) -> Result<()> {
        for duration in MatchDuration::ALL {
            for bet in duel_core::types::ALLOWED_BETS_MICROS {
                let key = QueueKey::new(duration, bet);
                let entries = self.queues.list(key.duration_secs, key.bet).await?;
                if entries.iter().any(|e| &e.player == player) {
                    self.leave_queue(player, duration, bet).await?;
                }
            }
        }
        Ok(())
    }

    /// Sums the bets `player` currently has at stake: every queue entry of
    /// theirs plus the bet amount of every non-terminal match they're in
    /// (§4.2). Used to reconcile `Ledger`'s `frozen` field on reconnect,
    /// independently of whatever it currently holds.
    pub async fn active_frozen_total(&self, player: &Addr) -> Result<Micros> {
        let mut total = 0;
        for duration in MatchDuration::ALL {
            for bet in duel_core::types::ALLOWED_BETS_MICROS {
                let key = QueueKey::new(duration, bet);
                if self.queues.list(key.duration_secs, key.bet).await?.iter().any(|e| &e.player == player) {
                    total += bet;
                }
            }
        }
        for status in ["awaiting_deposits", "active"] {
            for m in self.matches.find_by_status(status).await? {
                if m.has_player(player) {
                    total += m.bet_amount;
                }
            }
        }
        Ok(total)
    }

    /// Aggregate counts grouped by `(duration, bet)`, for UI display.
    pub async fn queue_stats(&self) -> Result<Vec<(MatchDuration, Micros, usize)>> {
        let mut stats = Vec::new();
        for duration in MatchDuration::ALL {
            for bet in duel_core::types::ALLOWED_BETS_MICROS {
                let key = QueueKey::new(duration, bet);
                let count = self.queues.list(key.duration_secs, key.bet).await?.len();
                if count > 0 {
                    stats.push((duration, bet, count));
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_persistence::InMemoryStore;

    fn matchmaking() -> Matchmaking {
        let store: Arc<dyn PersistenceT> = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(Ledger::new(store.clone()));
        Matchmaking::new(store, ledger)
    }

    #[tokio::test]
    async fn first_joiner_is_queued_second_joiner_is_matched() {
        let mm = matchmaking();
        mm.ledger.credit(&"p1".to_string(), 10_000_000).await.unwrap();
        mm.ledger.credit(&"p2".to_string(), 10_000_000).await.unwrap();

        let first = mm
            .join_queue("p1".into(), None, MatchDuration::FiveMinutes, 1_000_000, 0)
            .await
            .unwrap();
        assert!(matches!(first, JoinQueueOutcome::Queued));

        let second = mm
            .join_queue("p2".into(), None, MatchDuration::FiveMinutes, 1_000_000, 10)
            .await
            .unwrap();
        match second {
            JoinQueueOutcome::Matched { opponent, new_match } => {
                assert_eq!(opponent.player, "p1");
                assert!(new_match.has_player("p1") && new_match.has_player("p2"));
            }
            _ => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn join_fails_with_insufficient_balance() {
        let mm = matchmaking();
        let err = mm
            .join_queue("p1".into(), None, MatchDuration::FiveMinutes, 1_000_000, 0)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn leave_queue_unfreezes_and_removes() {
        let mm = matchmaking();
        mm.ledger.credit(&"p1".to_string(), 10_000_000).await.unwrap();
        mm.join_queue("p1".into(), None, MatchDuration::FiveMinutes, 1_000_000, 0)
            .await
            .unwrap();
        mm.leave_queue(&"p1".to_string(), MatchDuration::FiveMinutes, 1_000_000)
            .await
            .unwrap();

        let balance = mm.ledger.balance_of(&"p1".to_string()).await.unwrap();
        assert_eq!(balance.frozen, 0);
        let stats = mm.queue_stats().await.unwrap();
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn active_frozen_total_counts_queue_entries_and_live_matches() {
        let mm = matchmaking();
        let p1 = "p1".to_string();
        let p2 = "p2".to_string();
        let p3 = "p3".to_string();
        mm.ledger.credit(&p1, 20_000_000).await.unwrap();
        mm.ledger.credit(&p2, 10_000_000).await.unwrap();
        mm.ledger.credit(&p3, 10_000_000).await.unwrap();

        mm.join_queue(p1.clone(), None, MatchDuration::FiveMinutes, 5_000_000, 0)
            .await
            .unwrap();
        mm.join_queue(p2.clone(), None, MatchDuration::FiveMinutes, 5_000_000, 10)
            .await
            .unwrap();
        mm.join_queue(p1.clone(), None, MatchDuration::FifteenMinutes, 10_000_000, 20)
            .await
            .unwrap();

        assert_eq!(mm.active_frozen_total(&p1).await.unwrap(), 15_000_000);
        assert_eq!(mm.active_frozen_total(&p3).await.unwrap(), 0);
    }
}
