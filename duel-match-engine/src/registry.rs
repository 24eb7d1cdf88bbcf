use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::info;

use duel_core::types::Match;
use duel_persistence::MatchRepo;

use crate::actor::MatchActor;
use crate::command::{MatchCommand, MatchDeps, MatchHandle};

const MAILBOX_CAPACITY: usize = 256;

/// Lazily spawns and tracks one actor task per live match: a second
/// `load_match` call for an id already in flight gets back the existing
/// handle instead of a second actor, and the registry entry is removed
/// only once the actor's own task has actually exited (`wait_and_unload`).
#[derive(Clone)]
pub struct MatchRegistry {
    matches: Arc<Mutex<HashMap<String, MatchHandle>>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, match_id: &str) -> Option<MatchHandle> {
        self.matches.lock().await.get(match_id).cloned()
    }

    /// Returns the handle for `match_id`, spawning a fresh actor from
    /// persisted state if none is currently running.
    pub async fn load_match(&self, match_id: &str, deps: MatchDeps) -> duel_core::Result<MatchHandle> {
        let mut guard = self.matches.lock().await;
        if let Entry::Vacant(slot) = guard.entry(match_id.to_string()) {
            let m = MatchRepo::new(deps.store.clone())
                .get(match_id)
                .await?
                .ok_or_else(|| duel_core::Error::MatchNotFound(match_id.to_string()))?;
            let handle = self.spawn(match_id.to_string(), m, deps);
            slot.insert(handle);
        }
        Ok(guard.get(match_id).unwrap().clone())
    }

    fn spawn(&self, match_id: String, m: Match, deps: MatchDeps) -> MatchHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let matches = self.matches.clone();
        let store = deps.store.clone();
        let self_tx = tx.clone();
        let spawned_id = match_id.clone();

        let on_terminal: Box<dyn FnOnce(Match) + Send> = Box::new(move |final_state: Match| {
            let matches = matches.clone();
            let store = store.clone();
            let id = spawned_id.clone();
            tokio::spawn(async move {
                let _ = MatchRepo::new(store).set(&final_state).await;
                matches.lock().await.remove(&id);
                info!("Unloaded match actor {}", id);
            });
        });

        let actor = MatchActor::new(match_id, m, deps, self_tx, on_terminal);
        tokio::spawn(actor.run(rx));
        MatchHandle { tx }
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_chain::{ChainT, MockChain};
    use duel_core::types::MatchDuration;
    use duel_ledger::Ledger;
    use duel_oracle::PriceOracle;
    use duel_persistence::InMemoryStore;
    use duel_position_engine::ClosingRegistry;
    use duel_session::SessionRegistry;
    use duel_settlement::Settlement;
    use std::sync::Arc as StdArc;

    fn deps(store: StdArc<dyn duel_persistence::PersistenceT>) -> MatchDeps {
        let oracle = StdArc::new(PriceOracle::new());
        let ledger = StdArc::new(Ledger::new(store.clone()));
        let closing = ClosingRegistry::new();
        let sessions = SessionRegistry::new();
        let chain: StdArc<dyn ChainT> = StdArc::new(MockChain::new());
        let settlement = StdArc::new(Settlement::new(
            store.clone(),
            oracle.clone(),
            ledger.clone(),
            chain,
            closing.clone(),
            sessions.clone(),
            0.00001,
        ));
        MatchDeps {
            oracle,
            ledger,
            closing,
            sessions,
            settlement,
            price_max_age_ms: 10_000,
            forfeit_grace_ms: 60_000,
            broadcast_interval_ms: 50,
            settlement_interval_ms: 25,
            store,
        }
    }

    #[tokio::test]
    async fn load_match_is_idempotent_for_an_in_flight_match() {
        let store: StdArc<dyn duel_persistence::PersistenceT> = StdArc::new(InMemoryStore::new());
        let m = Match::new_active(
            "m1".into(), "p1".into(), "p2".into(), MatchDuration::FiveMinutes, 10_000_000, 0,
        );
        MatchRepo::new(store.clone()).set(&m).await.unwrap();

        let registry = MatchRegistry::new();
        let h1 = registry.load_match("m1", deps(store.clone())).await.unwrap();
        let h2 = registry.load_match("m1", deps(store.clone())).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(h1
            .send(MatchCommand::JoinMatch { player: "p1".into(), reply: tx })
            .await);
        rx.await.unwrap().unwrap();
        assert!(h2.send(MatchCommand::Shutdown).await);
    }

    #[tokio::test]
    async fn load_match_errors_for_an_unknown_id() {
        let store: StdArc<dyn duel_persistence::PersistenceT> = StdArc::new(InMemoryStore::new());
        let registry = MatchRegistry::new();
        let err = registry.load_match("nope", deps(store)).await;
        assert!(matches!(err, Err(duel_core::Error::MatchNotFound(_))));
    }
}
