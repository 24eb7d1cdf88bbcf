use tokio::sync::oneshot;

use duel_core::types::{Addr, Asset, Micros, Position};
use duel_core::Result;
use duel_session::SessionRegistry;

/// Commands accepted by a match actor's mailbox (§4.10's gameplay command
/// table). The actor is the single serialisation point for all state
/// mutation of one match, owning that match's event stream end to end.
pub enum MatchCommand {
    JoinMatch {
        player: Addr,
        reply: oneshot::Sender<Result<JoinMatchReply>>,
    },
    OpenPosition {
        player: Addr,
        asset: Asset,
        is_long: bool,
        size: Micros,
        leverage: u32,
        sl: Option<Micros>,
        tp: Option<Micros>,
        position_id: Option<String>,
        reply: oneshot::Sender<Result<Position>>,
    },
    ClosePosition {
        player: Addr,
        position_id: String,
        reply: oneshot::Sender<Result<Position>>,
    },
    PartialClose {
        player: Addr,
        position_id: String,
        fraction: f64,
        reply: oneshot::Sender<Result<Position>>,
    },
    ChatMessage {
        player: Addr,
        content: String,
        reply: oneshot::Sender<Result<()>>,
    },
    PlayerDisconnected {
        player: Addr,
    },
    PlayerReconnected {
        player: Addr,
    },
    /// Self-addressed wake-up from a forfeit timer spawned on disconnect;
    /// `generation` lets a stale timer recognise it has been superseded by
    /// a later reconnect/disconnect without needing to abort the sleep.
    ForfeitFire {
        player: Addr,
        generation: u64,
    },
    Shutdown,
}

pub struct JoinMatchReply {
    pub positions: Vec<Position>,
    pub match_is_terminal: bool,
}

/// A cheap, cloneable reference to a running match actor's mailbox, handed
/// out by [`crate::registry::MatchRegistry`].
#[derive(Clone)]
pub struct MatchHandle {
    pub(crate) tx: tokio::sync::mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    pub async fn send(&self, cmd: MatchCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }
}

/// Everything a match actor needs from the outside world, grouped so
/// `MatchRegistry::load_match` can pass a single bundle into each spawn.
pub struct MatchDeps {
    pub store: std::sync::Arc<dyn duel_persistence::PersistenceT>,
    pub oracle: std::sync::Arc<duel_oracle::PriceOracle>,
    pub ledger: std::sync::Arc<duel_ledger::Ledger>,
    pub closing: duel_position_engine::ClosingRegistry,
    pub sessions: SessionRegistry,
    pub settlement: std::sync::Arc<duel_settlement::Settlement>,
    pub price_max_age_ms: u64,
    pub forfeit_grace_ms: u64,
    pub broadcast_interval_ms: u64,
    pub settlement_interval_ms: u64,
}
