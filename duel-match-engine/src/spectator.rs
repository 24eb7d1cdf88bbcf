use duel_core::constants::DEMO_BALANCE_MICROS;
use duel_core::types::{Addr, Match, PriceSnapshot, Position};
use duel_position_engine::unrealised_pnl;
use duel_session::{SpectatorAggregate, SpectatorPosition};

/// Builds the spectator-facing aggregates and sanitised position list for
/// one match (§4.8: both players' equity/PnL plus each open position's
/// asset/isLong/leverage/size/entryPrice/pnl, SL/TP withheld), shared by
/// the broadcast-tick `spectator_update` and the handshake-time
/// `spectator_snapshot`.
pub fn build_spectator_view(
    m: &Match,
    open_positions: &[Position],
    snapshot: Option<PriceSnapshot>,
) -> (SpectatorAggregate, SpectatorAggregate, Vec<SpectatorPosition>) {
    let aggregate_for = |player: &Addr| {
        let total_pnl = open_positions
            .iter()
            .filter(|p| p.player_address == *player)
            .map(|p| live_pnl(p, snapshot))
            .sum();
        SpectatorAggregate {
            equity: DEMO_BALANCE_MICROS + total_pnl,
            total_pnl,
        }
    };

    let positions = open_positions
        .iter()
        .map(|p| SpectatorPosition {
            player_address: p.player_address.clone(),
            asset: p.asset,
            is_long: p.is_long,
            leverage: p.leverage,
            size: p.size,
            entry_price: p.entry_price,
            pnl: live_pnl(p, snapshot),
        })
        .collect();

    (aggregate_for(&m.player1), aggregate_for(&m.player2), positions)
}

fn live_pnl(position: &Position, snapshot: Option<PriceSnapshot>) -> duel_core::types::Micros {
    let current = snapshot.map(|s| s.price_of(position.asset)).unwrap_or(position.entry_price);
    unrealised_pnl(position.entry_price, current, position.size, position.leverage, position.is_long)
}
