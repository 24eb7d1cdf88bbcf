use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use duel_core::types::{Addr, CloseReason, Match, MatchStatus, Micros, Position, PriceSnapshot};
use duel_core::{now_ms, Error, Result};
use duel_persistence::{MatchRepo, UserRepo};
use duel_position_engine::{unrealised_pnl, PositionEngine};
use duel_session::ServerMessage;

use crate::command::{JoinMatchReply, MatchCommand, MatchDeps};

/// Owns all mutable state for one match: the single serialisation point
/// for position opens/closes, chat, and the forfeit/settlement tick
/// loops, owning that match's event stream end to end.
pub struct MatchActor {
    match_id: String,
    m: Match,
    deps: MatchDeps,
    positions: PositionEngine,
    matches: MatchRepo,
    users: UserRepo,
    self_tx: mpsc::Sender<MatchCommand>,
    forfeit_generations: HashMap<Addr, Arc<AtomicU64>>,
    on_terminal: std::sync::Mutex<Option<Box<dyn FnOnce(Match) + Send>>>,
}

impl MatchActor {
    pub fn new(
        match_id: String,
        m: Match,
        deps: MatchDeps,
        self_tx: mpsc::Sender<MatchCommand>,
        on_terminal: Box<dyn FnOnce(Match) + Send>,
    ) -> Self {
        let store = deps.store.clone();
        Self {
            matches: MatchRepo::new(store.clone()),
            users: UserRepo::new(store.clone()),
            positions: PositionEngine::new(store, deps.closing.clone()),
            match_id,
            m,
            deps,
            self_tx,
            forfeit_generations: HashMap::new(),
            on_terminal: std::sync::Mutex::new(Some(on_terminal)),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<MatchCommand>) {
        info!("Starting match actor {}", self.match_id);
        let mut broadcast_tick = interval(Duration::from_millis(self.deps.broadcast_interval_ms));
        let mut settlement_tick = interval(Duration::from_millis(self.deps.settlement_interval_ms));

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(MatchCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                _ = broadcast_tick.tick() => self.broadcast_prices_and_updates().await,
                _ = settlement_tick.tick() => self.run_auto_close_and_timer_sweep().await,
            }

            if self.m.status.is_terminal() {
                break;
            }
        }

        self.deps.sessions.close_match_rooms(&self.match_id).await;
        if let Some(cb) = self.on_terminal.lock().unwrap().take() {
            cb(self.m.clone());
        }
        info!("Stopping match actor {}", self.match_id);
    }

    async fn handle_command(&mut self, cmd: MatchCommand) {
        match cmd {
            MatchCommand::JoinMatch { player, reply } => {
                let _ = reply.send(self.on_join_match(&player).await);
            }
            MatchCommand::OpenPosition {
                player, asset, is_long, size, leverage, sl, tp, position_id, reply,
            } => {
                let _ = reply.send(
                    self.on_open_position(&player, asset, is_long, size, leverage, sl, tp, position_id)
                        .await,
                );
            }
            MatchCommand::ClosePosition { player, position_id, reply } => {
                let _ = reply.send(self.on_close_position(&player, &position_id).await);
            }
            MatchCommand::PartialClose { player, position_id, fraction, reply } => {
                let _ = reply.send(self.on_partial_close(&player, &position_id, fraction).await);
            }
            MatchCommand::ChatMessage { player, content, reply } => {
                let _ = reply.send(self.on_chat_message(&player, content).await);
            }
            MatchCommand::PlayerDisconnected { player } => self.on_player_disconnected(player).await,
            MatchCommand::PlayerReconnected { player } => self.cancel_forfeit_timer(&player),
            MatchCommand::ForfeitFire { player, generation } => self.on_forfeit_fire(player, generation).await,
            MatchCommand::Shutdown => {}
        }
    }

    fn require_player(&self, player: &Addr) -> Result<()> {
        if !self.m.has_player(player) {
            return Err(Error::NotAPlayer);
        }
        Ok(())
    }

    fn require_active(&self) -> Result<()> {
        if self.m.status != MatchStatus::Active {
            return Err(Error::MatchNotActive);
        }
        Ok(())
    }

    async fn on_join_match(&mut self, player: &Addr) -> Result<JoinMatchReply> {
        self.require_player(player)?;
        self.cancel_forfeit_timer(player);
        let positions = self.positions.open_positions_for_match(&self.match_id).await?;
        Ok(JoinMatchReply {
            positions,
            match_is_terminal: self.m.status.is_terminal(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_open_position(
        &mut self,
        player: &Addr,
        asset: duel_core::types::Asset,
        is_long: bool,
        size: duel_core::types::Micros,
        leverage: u32,
        sl: Option<duel_core::types::Micros>,
        tp: Option<duel_core::types::Micros>,
        position_id: Option<String>,
    ) -> Result<Position> {
        self.require_player(player)?;
        self.require_active()?;

        if size < 1 || size > duel_core::constants::DEMO_BALANCE_MICROS {
            return Err(Error::Validation("size out of range".into()));
        }
        if leverage < 1 {
            return Err(Error::Validation("leverage must be at least 1".into()));
        }

        let id = position_id.unwrap_or_else(|| format!("{}_{}_{}", self.match_id, player, now_ms()));
        if let Some(existing) = self.positions.get(&id).await? {
            if existing.player_address == *player {
                return Ok(existing);
            }
        }

        let open_positions = self.positions.open_positions_for_match(&self.match_id).await?;
        let open_size: duel_core::types::Micros = open_positions
            .iter()
            .filter(|p| p.player_address == *player)
            .map(|p| p.size)
            .sum();
        if open_size + size > duel_core::constants::DEMO_BALANCE_MICROS {
            return Err(Error::InsufficientBalance);
        }

        let now = now_ms();
        let price = self
            .deps
            .oracle
            .price_of(asset, now, self.deps.price_max_age_ms)
            .await?;

        if let Some(sl) = sl {
            let valid = if is_long { sl < price } else { sl > price };
            if !valid {
                return Err(Error::Validation("stop loss is on the wrong side of entry".into()));
            }
        }
        if let Some(tp) = tp {
            let valid = if is_long { tp > price } else { tp < price };
            if !valid {
                return Err(Error::Validation("take profit is on the wrong side of entry".into()));
            }
        }

        let position = self
            .positions
            .open_position(id, self.match_id.clone(), player.clone(), asset, is_long, price, size, leverage, sl, tp, now)
            .await?;

        self.push_opponent_update(player).await;
        Ok(position)
    }

    async fn on_close_position(&mut self, player: &Addr, position_id: &str) -> Result<Position> {
        self.require_player(player)?;
        self.own_open_position(player, position_id).await?;

        let now = now_ms();
        let asset = self
            .positions
            .get(position_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?
            .asset;
        let exit_price = match self.deps.oracle.price_of(asset, now, self.deps.price_max_age_ms).await {
            Ok(p) => p,
            Err(_) => self.positions.get(position_id).await?.unwrap().entry_price,
        };

        match self
            .positions
            .close_position(position_id, exit_price, CloseReason::Manual, now)
            .await?
        {
            Some(position) => {
                self.push_opponent_update(player).await;
                Ok(position)
            }
            None => Err(Error::AlreadyClosing),
        }
    }

    async fn on_partial_close(&mut self, player: &Addr, position_id: &str, fraction: f64) -> Result<Position> {
        self.require_player(player)?;
        self.own_open_position(player, position_id).await?;

        let now = now_ms();
        let asset = self
            .positions
            .get(position_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?
            .asset;
        let exit_price = self.deps.oracle.price_of(asset, now, self.deps.price_max_age_ms).await?;
        let new_id = format!("{position_id}_partial_{now}");

        match self
            .positions
            .partial_close(position_id, new_id, fraction, exit_price, now)
            .await?
        {
            Some((closed_child, _remaining)) => {
                self.push_opponent_update(player).await;
                Ok(closed_child)
            }
            None => Err(Error::AlreadyClosing),
        }
    }

    async fn own_open_position(&self, player: &Addr, position_id: &str) -> Result<()> {
        let position = self
            .positions
            .get(position_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;
        if position.player_address != *player {
            return Err(Error::Permission("not the position owner".into()));
        }
        if !position.is_open() {
            return Err(Error::Invariant("position already closed".into()));
        }
        Ok(())
    }

    async fn on_chat_message(&mut self, player: &Addr, content: String) -> Result<()> {
        self.require_player(player)?;
        let cleaned = duel_core::types::strip_control_chars(&content);
        if cleaned.is_empty() || cleaned.chars().count() > duel_core::constants::CHAT_MAX_LENGTH {
            return Err(Error::Validation("chat message is empty or too long".into()));
        }

        let sender_tag = self
            .users
            .get(player)
            .await?
            .map(|u| u.gamer_tag)
            .unwrap_or_else(|| player.clone());

        let msg = ServerMessage::ChatMessage {
            match_id: self.match_id.clone(),
            sender: player.clone(),
            sender_tag,
            content: cleaned,
            timestamp: now_ms(),
        };
        self.deps.sessions.broadcast_to_match_and_spectators(&self.match_id, msg).await;
        Ok(())
    }

    /// Recomputes `player`'s live unrealised PnL against the current oracle
    /// snapshot and pushes it to their opponent (§4.8's `opponent_update`).
    async fn push_opponent_update(&self, player: &Addr) {
        let Some(opponent) = self.m.other_player(player).cloned() else {
            return;
        };
        let positions = self
            .positions
            .open_positions_for_match(&self.match_id)
            .await
            .unwrap_or_default();
        let snapshot = self.deps.oracle.snapshot().await;
        let total_pnl = Self::live_unrealised_pnl(player, &positions, snapshot);
        let open_position_count = positions.iter().filter(|p| p.player_address == *player).count() as u32;
        self.deps
            .sessions
            .broadcast_to_user(
                &opponent,
                ServerMessage::OpponentUpdate {
                    match_id: self.match_id.clone(),
                    total_pnl,
                    open_position_count,
                },
            )
            .await;
    }

    fn live_unrealised_pnl(player: &Addr, positions: &[Position], snapshot: Option<PriceSnapshot>) -> Micros {
        positions
            .iter()
            .filter(|p| p.player_address == *player)
            .map(|p| {
                let current = snapshot.map(|s| s.price_of(p.asset)).unwrap_or(p.entry_price);
                unrealised_pnl(p.entry_price, current, p.size, p.leverage, p.is_long)
            })
            .sum()
    }

    /// Every broadcast tick (§4.8): the price snapshot, plus both players'
    /// {equity, totalPnl, openCount, roi} recomputed over their open
    /// positions against that same snapshot.
    async fn broadcast_prices_and_updates(&self) {
        let Some(snap) = self.deps.oracle.snapshot().await else {
            return;
        };
        self.deps
            .sessions
            .broadcast_to_match_and_spectators(
                &self.match_id,
                ServerMessage::PriceUpdate {
                    btc: snap.btc,
                    eth: snap.eth,
                    sol: snap.sol,
                    timestamp: snap.timestamp,
                },
            )
            .await;

        let positions = self
            .positions
            .open_positions_for_match(&self.match_id)
            .await
            .unwrap_or_default();
        for (player, opponent) in [
            (&self.m.player1, &self.m.player2),
            (&self.m.player2, &self.m.player1),
        ] {
            let total_pnl = Self::live_unrealised_pnl(player, &positions, Some(snap));
            let open_position_count = positions.iter().filter(|p| p.player_address == *player).count() as u32;
            self.deps
                .sessions
                .broadcast_to_user(
                    opponent,
                    ServerMessage::OpponentUpdate {
                        match_id: self.match_id.clone(),
                        total_pnl,
                        open_position_count,
                    },
                )
                .await;
        }

        self.push_spectator_update(&positions, Some(snap)).await;
    }

    /// `spectator_update` (§4.8): only sent while at least one spectator is
    /// connected to this match's spectator room.
    async fn push_spectator_update(&self, open_positions: &[Position], snapshot: Option<PriceSnapshot>) {
        if self.deps.sessions.spectator_count(&self.match_id).await == 0 {
            return;
        }
        let (player1, player2, positions) = crate::spectator::build_spectator_view(&self.m, open_positions, snapshot);
        self.deps
            .sessions
            .broadcast_to_spectators(
                &self.match_id,
                ServerMessage::SpectatorUpdate {
                    match_id: self.match_id.clone(),
                    player1,
                    player2,
                    positions,
                },
            )
            .await;
    }

    /// SL/TP/liquidation evaluation tick (§4.8) plus the match-timer check
    /// that triggers settlement; the actual settlement math (closing
    /// remaining positions at frozen prices, ROI, payout, broadcast,
    /// on-chain submission) lives in `duel-settlement` and runs here once
    /// the timer fires.
    async fn run_auto_close_and_timer_sweep(&mut self) {
        if self.m.status != MatchStatus::Active {
            return;
        }

        let now = now_ms();
        if now >= self.m.end_time {
            match self
                .deps
                .settlement
                .finalize_match(&self.match_id, duel_settlement::FinalizeReason::TimerExpired, now)
                .await
            {
                Ok(m) => self.m = m,
                Err(e) => warn!("Settlement failed for {}, will retry next tick: {}", self.match_id, e),
            }
            return;
        }

        let Ok(positions) = self.positions.open_positions_for_match(&self.match_id).await else {
            return;
        };
        for position in positions {
            let Ok(price) = self
                .deps
                .oracle
                .price_of(position.asset, now, self.deps.price_max_age_ms)
                .await
            else {
                continue;
            };
            let reason = self.trigger_reason(&position, price);
            if let Some(reason) = reason {
                if let Ok(Some(_)) = self
                    .positions
                    .close_position(&position.id, price, reason, now)
                    .await
                {
                    self.push_opponent_update(&position.player_address).await;
                }
            }
        }
    }

    fn trigger_reason(&self, position: &Position, price: duel_core::types::Micros) -> Option<CloseReason> {
        let liq = duel_position_engine::liquidation_price(position.entry_price, position.leverage, position.is_long);
        let hit_liquidation = if position.is_long { price <= liq } else { price >= liq };
        if hit_liquidation {
            return Some(CloseReason::Liquidation);
        }
        if let Some(sl) = position.sl {
            let hit = if position.is_long { price <= sl } else { price >= sl };
            if hit {
                return Some(CloseReason::Sl);
            }
        }
        if let Some(tp) = position.tp {
            let hit = if position.is_long { price >= tp } else { price <= tp };
            if hit {
                return Some(CloseReason::Tp);
            }
        }
        None
    }

    async fn on_player_disconnected(&mut self, player: Addr) {
        if self.m.status != MatchStatus::Active {
            return;
        }
        let generation = Arc::new(AtomicU64::new(1));
        self.forfeit_generations.insert(player.clone(), generation.clone());

        let tx = self.self_tx.clone();
        let grace_ms = self.deps.forfeit_grace_ms;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(grace_ms)).await;
            let gen_value = generation.load(Ordering::SeqCst);
            let _ = tx
                .send(MatchCommand::ForfeitFire { player, generation: gen_value })
                .await;
        });
    }

    fn cancel_forfeit_timer(&mut self, player: &Addr) {
        if let Some(generation) = self.forfeit_generations.remove(player) {
            generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn on_forfeit_fire(&mut self, player: Addr, generation: u64) {
        let current = self
            .forfeit_generations
            .get(&player)
            .map(|g| g.load(Ordering::SeqCst));
        if current != Some(generation) {
            return; // cancelled or superseded by a later disconnect
        }
        if self.m.status != MatchStatus::Active {
            return;
        }
        warn!("Player {} forfeited match {}", player, self.match_id);
        self.forfeit_generations.remove(&player);

        let now = now_ms();
        match self
            .deps
            .settlement
            .finalize_match(
                &self.match_id,
                duel_settlement::FinalizeReason::Forfeit { forfeiting_player: player },
                now,
            )
            .await
        {
            Ok(m) => self.m = m,
            Err(e) => warn!("Forfeit settlement failed for {}: {}", self.match_id, e),
        }
    }

    pub fn match_snapshot(&self) -> Match {
        self.m.clone()
    }
}
