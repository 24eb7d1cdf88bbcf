use serde::{Deserialize, Serialize};

use duel_core::types::{Addr, Asset, CloseReason, Micros, Position, TimestampMs};

/// Messages the client sends unprompted over the single `/ws` duplex
/// connection (§6.2). Every client message and server message carries a
/// `type` discriminant — there is no JSON-RPC request/response pairing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
    SpectateMatch { match_id: String },
    JoinQueue { duration: String, bet: Micros },
    LeaveQueue { duration: Option<String>, bet: Option<Micros> },
    JoinMatch { match_id: String },
    OpenPosition {
        match_id: String,
        asset: Asset,
        is_long: bool,
        size: Micros,
        leverage: u32,
        sl: Option<Micros>,
        tp: Option<Micros>,
        position_id: Option<String>,
    },
    ClosePosition { match_id: String, position_id: String },
    PartialClose { match_id: String, position_id: String, fraction: f64 },
    ChatMessage { match_id: String, content: String },
}

/// Messages the server pushes to clients (§6.2). `error` carries an
/// optional `position_id` so a rejected `open_position` can echo the
/// client-supplied id back for optimistic-UI rollback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(clippy::large_enum_variant)]
pub enum ServerMessage {
    WsConnected,
    AuthOk { address: String },
    Error { code: String, message: String, position_id: Option<String> },
    QueueJoined { duration: String, bet: Micros },
    QueueLeft,
    MatchFound {
        match_id: String,
        opponent_tag: String,
        duration: String,
        bet: Micros,
        start_time: TimestampMs,
        end_time: TimestampMs,
    },
    MatchSnapshot {
        match_id: String,
        positions: Vec<Position>,
        balance_total: Micros,
        balance_available: Micros,
    },
    MatchEnd {
        match_id: String,
        winner: Option<String>,
        player1_roi: Option<f64>,
        player2_roi: Option<f64>,
    },
    PriceUpdate { btc: Micros, eth: Micros, sol: Micros, timestamp: TimestampMs },
    OpponentUpdate { match_id: String, total_pnl: Micros, open_position_count: u32 },
    OpponentDisconnected { match_id: String, grace_seconds: u64 },
    OpponentReconnected { match_id: String },
    PositionOpened { position: Position },
    PositionClosed { position: Position, reason: CloseReason },
    BalanceUpdate { total: Micros, frozen: Micros, available: Micros },
    ChatMessage { match_id: String, sender: String, sender_tag: String, content: String, timestamp: TimestampMs },
    SpectatorSnapshot {
        match_id: String,
        player1: SpectatorAggregate,
        player2: SpectatorAggregate,
        positions: Vec<SpectatorPosition>,
    },
    SpectatorUpdate {
        match_id: String,
        player1: SpectatorAggregate,
        player2: SpectatorAggregate,
        positions: Vec<SpectatorPosition>,
    },
}

/// A player's aggregates as shown to spectators (§4.8): equity is the demo
/// balance plus unrealised PnL over that player's open positions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpectatorAggregate {
    pub equity: Micros,
    pub total_pnl: Micros,
}

/// An open position as shown to spectators — SL/TP are withheld (§4.8).
#[derive(Debug, Clone, Serialize)]
pub struct SpectatorPosition {
    pub player_address: Addr,
    pub asset: Asset,
    pub is_long: bool,
    pub leverage: u32,
    pub size: Micros,
    pub entry_price: Micros,
    pub pnl: Micros,
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
            position_id: None,
        }
    }

    pub fn error_with_position(code: &str, message: impl Into<String>, position_id: String) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
            position_id: Some(position_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tag_round_trips() {
        let raw = r#"{"type":"join_queue","duration":"5m","bet":1000000}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::JoinQueue { bet: 1_000_000, .. }));
    }

    #[test]
    fn server_error_serializes_with_snake_case_type() {
        let msg = ServerMessage::error("insufficient_balance", "not enough funds");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], "insufficient_balance");
    }
}
