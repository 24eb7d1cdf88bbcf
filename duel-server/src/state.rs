use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use duel_chain::ChainT;
use duel_core::types::Addr;
use duel_env::Config;
use duel_ledger::Ledger;
use duel_match_engine::{MatchDeps, MatchRegistry};
use duel_matchmaking::Matchmaking;
use duel_oracle::PriceOracle;
use duel_persistence::PersistenceT;
use duel_position_engine::ClosingRegistry;
use duel_session::{RateLimiter, SessionRegistry};
use duel_settlement::{AdminLoops, Settlement};

/// Everything an axum handler or the WS loop needs, shared across the
/// composition root as a single context value. Cheap to clone — every
/// field is an `Arc` or an already-`Clone` registry.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceT>,
    pub oracle: Arc<PriceOracle>,
    pub ledger: Arc<Ledger>,
    pub closing: ClosingRegistry,
    pub sessions: SessionRegistry,
    pub chain: Arc<dyn ChainT>,
    pub settlement: Arc<Settlement>,
    pub matchmaking: Arc<Matchmaking>,
    pub match_registry: MatchRegistry,
    pub admin_loops: Arc<AdminLoops>,
    pub rate_limiter: Arc<RateLimiter>,
    pub nonces: Arc<Mutex<HashMap<Addr, String>>>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Builds a fresh [`MatchDeps`] bundle, as required every time a match
    /// actor is spawned or re-addressed via [`MatchRegistry::load_match`].
    pub fn match_deps(&self) -> MatchDeps {
        MatchDeps {
            store: self.store.clone(),
            oracle: self.oracle.clone(),
            ledger: self.ledger.clone(),
            closing: self.closing.clone(),
            sessions: self.sessions.clone(),
            settlement: self.settlement.clone(),
            price_max_age_ms: self.config.tuning.price_max_age_ms,
            forfeit_grace_ms: self.config.tuning.forfeit_grace_ms,
            broadcast_interval_ms: self.config.tuning.opponent_broadcast_interval_ms,
            settlement_interval_ms: self.config.tuning.settlement_interval_ms,
        }
    }
}
