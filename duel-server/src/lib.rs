pub mod error;
pub mod notify;
pub mod routes;
pub mod state;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use duel_chain::{ChainT, MockChain};
use duel_env::Config;
use duel_ledger::Ledger;
use duel_match_engine::MatchRegistry;
use duel_matchmaking::Matchmaking;
use duel_oracle::{run_price_feed, PriceOracle, SyntheticPriceSource};
use duel_persistence::{InMemoryStore, PersistenceT};
use duel_position_engine::ClosingRegistry;
use duel_session::{RateLimiter, SessionRegistry};
use duel_settlement::{AdminLoops, Settlement};

use state::AppState;

/// Builds every collaborator and wires them into an [`AppState`], the
/// composition root's context construction.
///
/// `duel-chain` ships only [`MockChain`]; `config.chain.use_mock` is read
/// for forward compatibility with a real RPC-backed [`ChainT`] but there is
/// none to select here yet, so the mock is always used regardless of its
/// value.
pub fn build_state(config: Config) -> (AppState, Vec<tokio::sync::oneshot::Sender<()>>) {
    let store: Arc<dyn PersistenceT> = Arc::new(InMemoryStore::new());
    let oracle = Arc::new(PriceOracle::new());
    let ledger = Arc::new(Ledger::new(store.clone()));
    let closing = ClosingRegistry::new();
    let sessions = SessionRegistry::new();
    let chain: Arc<dyn ChainT> = Arc::new(MockChain::new());
    let settlement = Arc::new(Settlement::new(
        store.clone(),
        oracle.clone(),
        ledger.clone(),
        chain.clone(),
        closing.clone(),
        sessions.clone(),
        config.tuning.tie_eps,
    ));
    let matchmaking = Arc::new(Matchmaking::new(store.clone(), ledger.clone()));
    let match_registry = MatchRegistry::new();
    let admin_loops = Arc::new(AdminLoops::new(store.clone(), ledger.clone(), settlement.clone()));
    let rate_limiter = Arc::new(RateLimiter::new());
    let config = Arc::new(config);

    let state = AppState {
        store,
        oracle,
        ledger,
        closing,
        sessions,
        chain,
        settlement,
        matchmaking,
        match_registry,
        admin_loops,
        rate_limiter,
        nonces: Arc::new(Mutex::new(std::collections::HashMap::new())),
        config,
    };

    let mut shutdowns = Vec::new();

    let (price_tx, price_rx) = tokio::sync::oneshot::channel();
    let price_source = Arc::new(SyntheticPriceSource::new(1_000, duel_core::now_ms));
    tokio::spawn(run_price_feed(
        state.oracle.clone(),
        price_source,
        state.config.tuning.price_feed_interval_ms,
        price_rx,
    ));
    shutdowns.push(price_tx);

    let (challenge_tx, challenge_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(
        state
            .admin_loops
            .clone()
            .run_challenge_expiry_sweep(state.config.tuning.challenge_expiry_sweep_ms, challenge_rx),
    );
    shutdowns.push(challenge_tx);

    let (settlement_tx, settlement_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(
        state
            .admin_loops
            .clone()
            .run_settlement_retry_sweep(state.config.tuning.settlement_retry_sweep_ms, settlement_rx),
    );
    shutdowns.push(settlement_tx);

    (state, shutdowns)
}

pub async fn run(path: &PathBuf) {
    let config = Config::from_path(path).await;
    let (state, _shutdowns) = build_state(config);
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    let router = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {addr}: {e}"));
    tracing::info!("duel-server listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
