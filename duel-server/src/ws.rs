use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Duration};
use tracing::{info, warn};

use duel_core::types::{Addr, CloseReason};
use duel_core::{now_ms, Error};
use duel_match_engine::{build_spectator_view, JoinMatchReply, MatchCommand};
use duel_persistence::MatchRepo;
use duel_position_engine::PositionEngine;
use duel_session::{ClientMessage, ServerMessage};

use crate::notify::{duration_label, notify_match_found, parse_duration};
use crate::state::AppState;

fn close_with(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection mutable handshake result. `address` is `None` for a
/// read-only spectator session (§4.10's `spectate_match` path).
struct Session {
    address: Option<Addr>,
    match_id: Option<String>,
    read_only: bool,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = format!("ws-{}-{}", now_ms(), rand::random::<u32>());

    let Some((mut session, mut user_rx, mut spectator_rx)) =
        (match perform_handshake(&mut sender, &mut receiver, &state).await {
            Ok(s) => Some(s),
            Err(close_code) => {
                let _ = sender.send(close_with(close_code, "handshake failed")).await;
                None
            }
        })
    else {
        return;
    };
    let mut match_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    let _ = sender.send(ws_message(&ServerMessage::WsConnected)).await;
    if let Some(address) = &session.address {
        let _ = sender
            .send(ws_message(&ServerMessage::AuthOk {
                address: address.clone(),
            }))
            .await;
    }

    let mut ping_tick = interval(Duration::from_millis(state.config.tuning.ws_ping_interval_ms));
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_inbound(&state, &conn_id, &mut session, &mut sender, &mut match_rx, text.as_bytes(), text.as_str()).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        let text = String::from_utf8_lossy(&bytes).into_owned();
                        if !handle_inbound(&state, &conn_id, &mut session, &mut sender, &mut match_rx, &bytes, &text).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WS read error on {}: {}", conn_id, e);
                        break;
                    }
                }
            }
            _ = ping_tick.tick() => {
                if last_pong.elapsed() > Duration::from_millis(state.config.tuning.pong_timeout_ms) {
                    let _ = sender.send(close_with(4008, "pong timeout")).await;
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            Some(msg) = recv_optional(&mut user_rx), if user_rx.is_some() => {
                if sender.send(ws_message(&msg)).await.is_err() {
                    break;
                }
            }
            Some(msg) = recv_optional(&mut match_rx), if match_rx.is_some() => {
                if sender.send(ws_message(&msg)).await.is_err() {
                    break;
                }
            }
            Some(msg) = recv_optional(&mut spectator_rx), if spectator_rx.is_some() => {
                if sender.send(ws_message(&msg)).await.is_err() {
                    break;
                }
            }
        }
    }

    on_disconnect(&state, &session).await;
}

async fn recv_optional(rx: &mut Option<broadcast::Receiver<ServerMessage>>) -> Option<ServerMessage> {
    match rx {
        Some(r) => loop {
            match r.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        },
        None => std::future::pending().await,
    }
}

fn ws_message(msg: &ServerMessage) -> Message {
    Message::Text(serde_json::to_string(msg).unwrap_or_default())
}

/// Sends a fresh `balance_update` for `address` over `sender` (§4.10:
/// after `auth_ok`, and again after every `join_queue`/`leave_queue`).
async fn push_balance_update(
    state: &AppState,
    address: &Addr,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
) {
    if let Ok(balance) = state.ledger.balance_of(address).await {
        let _ = sender
            .send(ws_message(&ServerMessage::BalanceUpdate {
                total: balance.total,
                frozen: balance.frozen,
                available: balance.available,
            }))
            .await;
    }
}

/// Waits for the first client message (`auth` or `spectate_match`) within
/// `AUTH_TIMEOUT_MS` (§4.10). Returns the WS close code to use on failure.
type HandshakeOk = (
    Session,
    Option<broadcast::Receiver<ServerMessage>>,
    Option<broadcast::Receiver<ServerMessage>>,
);

async fn perform_handshake(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &AppState,
) -> Result<HandshakeOk, u16> {
    let timeout = Duration::from_millis(state.config.tuning.auth_timeout_ms);
    let first = tokio::select! {
        msg = receiver.next() => msg,
        _ = sleep(timeout) => return Err(4001),
    };

    let Some(Ok(Message::Text(text))) = first else {
        return Err(4001);
    };
    let parsed: ClientMessage = serde_json::from_str(&text).map_err(|_| 4001u16)?;

    match parsed {
        ClientMessage::Auth { token } => {
            let address = duel_core::auth::verify_token(&token, state.config.auth.token_secret.as_bytes())
                .map_err(|_| 4001u16)?;
            let Some(rx) = state
                .sessions
                .try_subscribe_user(&address, state.config.tuning.max_connections_per_user)
                .await
            else {
                return Err(4008);
            };

            if let Ok(active_frozen_total) = state.matchmaking.active_frozen_total(&address).await {
                let _ = state.ledger.reconcile_frozen_balance(&address, active_frozen_total).await;
            }
            push_balance_update(state, &address, sender).await;

            Ok((
                Session { address: Some(address), match_id: None, read_only: false },
                Some(rx),
                None,
            ))
        }
        ClientMessage::SpectateMatch { match_id } => {
            let Some(m) = MatchRepo::new(state.store.clone()).get(&match_id).await.ok().flatten() else {
                return Err(4004);
            };
            let rx = state.sessions.subscribe_spectators(&match_id).await;

            let engine = PositionEngine::new(state.store.clone(), state.closing.clone());
            let open_positions = engine.open_positions_for_match(&match_id).await.unwrap_or_default();
            let snapshot = state.oracle.snapshot().await;
            let (player1, player2, positions) = build_spectator_view(&m, &open_positions, snapshot);
            let _ = sender
                .send(ws_message(&ServerMessage::SpectatorSnapshot {
                    match_id: match_id.clone(),
                    player1,
                    player2,
                    positions,
                }))
                .await;

            Ok((
                Session { address: None, match_id: Some(match_id), read_only: true },
                None,
                Some(rx),
            ))
        }
        _ => Err(4001),
    }
}

/// Dispatches one inbound frame. Returns `false` when the connection should
/// be torn down.
async fn handle_inbound(
    state: &AppState,
    conn_id: &str,
    session: &mut Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_rx: &mut Option<broadcast::Receiver<ServerMessage>>,
    raw: &[u8],
    text: &str,
) -> bool {
    if raw.len() > state.config.tuning.ws_max_message_bytes {
        let _ = sender.send(ws_message(&ServerMessage::error("message_too_large", "message exceeds the size limit"))).await;
        return true;
    }

    let now = now_ms();
    if !state
        .rate_limiter
        .check(conn_id, state.config.tuning.ws_rate_limit_max, state.config.tuning.ws_rate_limit_window_ms, now)
        .await
    {
        let position_id = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v.get("positionId").and_then(|p| p.as_str()).map(str::to_string));
        let msg = match position_id {
            Some(id) => ServerMessage::error_with_position("rate_limit_exceeded", "too many messages", id),
            None => ServerMessage::error("rate_limit_exceeded", "too many messages"),
        };
        let _ = sender.send(ws_message(&msg)).await;
        return true;
    }

    let parsed: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("validation", e.to_string()))).await;
            return true;
        }
    };

    match parsed {
        ClientMessage::Auth { .. } | ClientMessage::SpectateMatch { .. } => {
            let _ = sender.send(ws_message(&ServerMessage::error("validation", "already connected"))).await;
        }
        ClientMessage::JoinQueue { duration, bet } => {
            handle_join_queue(state, session, sender, duration, bet).await;
        }
        ClientMessage::LeaveQueue { duration, bet } => {
            handle_leave_queue(state, session, sender, duration, bet).await;
        }
        ClientMessage::JoinMatch { match_id } => {
            handle_join_match(state, session, sender, match_rx, match_id).await;
        }
        ClientMessage::OpenPosition {
            match_id, asset, is_long, size, leverage, sl, tp, position_id,
        } => {
            handle_open_position(state, session, sender, match_id, asset, is_long, size, leverage, sl, tp, position_id).await;
        }
        ClientMessage::ClosePosition { match_id, position_id } => {
            handle_close_position(state, session, sender, match_id, position_id).await;
        }
        ClientMessage::PartialClose { match_id, position_id, fraction } => {
            handle_partial_close(state, session, sender, match_id, position_id, fraction).await;
        }
        ClientMessage::ChatMessage { match_id, content } => {
            handle_chat_message(state, session, sender, match_id, content).await;
        }
    }
    true
}

async fn require_player<'a>(session: &'a Session, sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin)) -> Option<&'a Addr> {
    if session.read_only {
        let _ = sender.send(ws_message(&ServerMessage::error("spectator_forbidden", "spectators cannot perform gameplay actions"))).await;
        return None;
    }
    match &session.address {
        Some(a) => Some(a),
        None => {
            let _ = sender.send(ws_message(&ServerMessage::error("auth", "not authenticated"))).await;
            None
        }
    }
}

async fn handle_join_queue(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    duration: String,
    bet: duel_core::types::Micros,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let duration = match parse_duration(&duration) {
        Ok(d) => d,
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("validation", e.to_string()))).await;
            return;
        }
    };
    let address = address.clone();
    match state.matchmaking.join_queue(address.clone(), None, duration, bet, now_ms()).await {
        Ok(duel_matchmaking::JoinQueueOutcome::Queued) => {
            let _ = sender.send(ws_message(&ServerMessage::QueueJoined { duration: duration_label(duration).into(), bet })).await;
            push_balance_update(state, &address, sender).await;
        }
        Ok(duel_matchmaking::JoinQueueOutcome::Matched { new_match, .. }) => {
            notify_match_found(state, &new_match).await;
            push_balance_update(state, &address, sender).await;
        }
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("join_queue_failed", e.to_string()))).await;
        }
    }
}

async fn handle_leave_queue(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    duration: Option<String>,
    bet: Option<duel_core::types::Micros>,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let result = match (duration, bet) {
        (Some(d), Some(bet)) => match parse_duration(&d) {
            Ok(duration) => state.matchmaking.leave_queue(address, duration, bet).await,
            Err(e) => Err(e),
        },
        _ => state.matchmaking.remove_from_all_queues(address).await,
    };
    match result {
        Ok(()) => {
            let _ = sender.send(ws_message(&ServerMessage::QueueLeft)).await;
            push_balance_update(state, address, sender).await;
        }
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("leave_queue_failed", e.to_string()))).await;
        }
    }
}

async fn handle_join_match(
    state: &AppState,
    session: &mut Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_rx: &mut Option<broadcast::Receiver<ServerMessage>>,
    match_id: String,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let address = address.clone();
    let handle = match state.match_registry.load_match(&match_id, state.match_deps()).await {
        Ok(h) => h,
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("join_match_failed", e.to_string()))).await;
            return;
        }
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    if !handle.send(MatchCommand::JoinMatch { player: address.clone(), reply: tx }).await {
        let _ = sender.send(ws_message(&ServerMessage::error("join_match_failed", "match actor is gone"))).await;
        return;
    }
    let reply: Result<JoinMatchReply, Error> = rx.await.unwrap_or(Err(Error::Invariant("actor dropped reply".into())));
    match reply {
        Ok(JoinMatchReply { positions, .. }) => {
            session.match_id = Some(match_id.clone());
            *match_rx = Some(state.sessions.subscribe_match(&match_id).await);

            let balance = state.ledger.balance_of(&address).await.unwrap_or(duel_core::types::BalanceView {
                total: 0,
                frozen: 0,
                available: 0,
            });
            let _ = sender
                .send(ws_message(&ServerMessage::MatchSnapshot {
                    match_id: match_id.clone(),
                    positions,
                    balance_total: balance.total,
                    balance_available: balance.available,
                }))
                .await;
            state
                .sessions
                .broadcast_to_match(&match_id, ServerMessage::OpponentReconnected { match_id: match_id.clone() })
                .await;
        }
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error("join_match_failed", e.to_string()))).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_open_position(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_id: String,
    asset: duel_core::types::Asset,
    is_long: bool,
    size: duel_core::types::Micros,
    leverage: u32,
    sl: Option<duel_core::types::Micros>,
    tp: Option<duel_core::types::Micros>,
    position_id: Option<String>,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let Some(handle) = state.match_registry.get(&match_id).await else {
        let _ = sender.send(ws_message(&ServerMessage::error("match_not_found", "no such live match"))).await;
        return;
    };
    let echo_id = position_id.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = handle
        .send(MatchCommand::OpenPosition {
            player: address.clone(), asset, is_long, size, leverage, sl, tp, position_id, reply: tx,
        })
        .await;
    match rx.await.unwrap_or(Err(Error::Invariant("actor dropped reply".into()))) {
        Ok(position) => {
            state
                .sessions
                .broadcast_to_match_and_spectators(&match_id, ServerMessage::PositionOpened { position })
                .await;
        }
        Err(e) => {
            let msg = match echo_id {
                Some(id) => ServerMessage::error_with_position("open_position_failed", e.to_string(), id),
                None => ServerMessage::error("open_position_failed", e.to_string()),
            };
            let _ = sender.send(ws_message(&msg)).await;
        }
    }
}

async fn handle_close_position(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_id: String,
    position_id: String,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let Some(handle) = state.match_registry.get(&match_id).await else {
        let _ = sender.send(ws_message(&ServerMessage::error("match_not_found", "no such live match"))).await;
        return;
    };
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = handle
        .send(MatchCommand::ClosePosition { player: address.clone(), position_id: position_id.clone(), reply: tx })
        .await;
    match rx.await.unwrap_or(Err(Error::Invariant("actor dropped reply".into()))) {
        Ok(position) => {
            state
                .sessions
                .broadcast_to_match_and_spectators(&match_id, ServerMessage::PositionClosed { position, reason: CloseReason::Manual })
                .await;
        }
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error_with_position("close_position_failed", e.to_string(), position_id))).await;
        }
    }
}

async fn handle_partial_close(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_id: String,
    position_id: String,
    fraction: f64,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let Some(handle) = state.match_registry.get(&match_id).await else {
        let _ = sender.send(ws_message(&ServerMessage::error("match_not_found", "no such live match"))).await;
        return;
    };
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = handle
        .send(MatchCommand::PartialClose { player: address.clone(), position_id: position_id.clone(), fraction, reply: tx })
        .await;
    match rx.await.unwrap_or(Err(Error::Invariant("actor dropped reply".into()))) {
        Ok(position) => {
            state
                .sessions
                .broadcast_to_match_and_spectators(&match_id, ServerMessage::PositionClosed { position, reason: CloseReason::Partial })
                .await;
        }
        Err(e) => {
            let _ = sender.send(ws_message(&ServerMessage::error_with_position("partial_close_failed", e.to_string(), position_id))).await;
        }
    }
}

async fn handle_chat_message(
    state: &AppState,
    session: &Session,
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    match_id: String,
    content: String,
) {
    let Some(address) = require_player(session, sender).await else { return };
    let Some(handle) = state.match_registry.get(&match_id).await else {
        let _ = sender.send(ws_message(&ServerMessage::error("match_not_found", "no such live match"))).await;
        return;
    };
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _ = handle
        .send(MatchCommand::ChatMessage { player: address.clone(), content, reply: tx })
        .await;
    if let Err(e) = rx.await.unwrap_or(Err(Error::Invariant("actor dropped reply".into()))) {
        let _ = sender.send(ws_message(&ServerMessage::error("chat_failed", e.to_string()))).await;
    }
}

async fn on_disconnect(state: &AppState, session: &Session) {
    let Some(address) = &session.address else {
        info!("Spectator session closed");
        return;
    };
    if state.sessions.user_connection_count(address).await == 0 {
        if let Err(e) = state.matchmaking.remove_from_all_queues(address).await {
            warn!("Failed to remove {} from queues on disconnect: {}", address, e);
        }
        if let Some(match_id) = &session.match_id {
            state
                .sessions
                .broadcast_to_match_and_spectators(
                    match_id,
                    ServerMessage::OpponentDisconnected {
                        match_id: match_id.clone(),
                        grace_seconds: state.config.tuning.forfeit_grace_ms / 1000,
                    },
                )
                .await;
            if let Some(handle) = state.match_registry.get(match_id).await {
                let _ = handle.send(MatchCommand::PlayerDisconnected { player: address.clone() }).await;
            }
        }
    }
    // A user with more than one live connection closing one of them does not
    // trigger a forfeit timer; the remaining connection keeps the match alive.
}
