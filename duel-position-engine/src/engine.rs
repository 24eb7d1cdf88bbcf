use std::sync::Arc;

use duel_core::types::{is_valid_position_id, Addr, Asset, CloseReason, Micros, Position, TimestampMs};
use duel_core::Result;
use duel_core::error::Error;
use duel_persistence::PositionRepo;

use crate::closing_guard::ClosingRegistry;
use crate::math::unrealised_pnl;

/// Opens and closes positions against the persistence layer, serialising
/// every close through the single-closer registry (§4.5). All numeric
/// inputs are assumed pre-validated by the caller (the match controller),
/// per §4.4.
pub struct PositionEngine {
    positions: PositionRepo,
    closing: ClosingRegistry,
}

impl PositionEngine {
    pub fn new(store: Arc<dyn duel_persistence::PersistenceT>, closing: ClosingRegistry) -> Self {
        Self {
            positions: PositionRepo::new(store),
            closing,
        }
    }

    pub async fn open_position(
        &self,
        id: String,
        match_id: String,
        player_address: Addr,
        asset: Asset,
        is_long: bool,
        entry_price: Micros,
        size: Micros,
        leverage: u32,
        sl: Option<Micros>,
        tp: Option<Micros>,
        opened_at: TimestampMs,
    ) -> Result<Position> {
        if !is_valid_position_id(&id) {
            return Err(Error::Validation("invalid position id".into()));
        }
        let position = Position {
            id,
            match_id,
            player_address,
            asset,
            is_long,
            entry_price,
            size,
            leverage,
            sl,
            tp,
            opened_at,
            exit_price: None,
            pnl: None,
            closed_at: None,
            close_reason: None,
        };
        self.positions.set(&position).await?;
        Ok(position)
    }

    /// Closes a position fully. Idempotent against concurrent closers: a
    /// caller that loses the race to `ClosingRegistry` gets back `Ok(None)`
    /// rather than an error, per §4.5's "abort cleanly" contract; a
    /// client-initiated call translates that into `AlreadyClosing` one
    /// layer up.
    pub async fn close_position(
        &self,
        position_id: &str,
        exit_price: Micros,
        reason: CloseReason,
        closed_at: TimestampMs,
    ) -> Result<Option<Position>> {
        let Some(_guard) = self.closing.try_claim(position_id).await else {
            return Ok(None);
        };

        let mut position = self
            .positions
            .get(position_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;

        if !position.is_open() {
            return Err(Error::Invariant(format!(
                "position {position_id} was already closed"
            )));
        }

        let pnl = unrealised_pnl(
            position.entry_price,
            exit_price,
            position.size,
            position.leverage,
            position.is_long,
        );

        position.exit_price = Some(exit_price);
        position.pnl = Some(pnl);
        position.closed_at = Some(closed_at);
        position.close_reason = Some(reason);

        self.positions.set(&position).await?;
        Ok(Some(position))
    }

    /// Splits off a closed child position of `fraction · orig.size` and
    /// shrinks the original by the same amount; both writes are made to
    /// look atomic to readers by serialising through the same per-position
    /// closing claim (§4.4).
    pub async fn partial_close(
        &self,
        position_id: &str,
        new_position_id: String,
        fraction: f64,
        exit_price: Micros,
        closed_at: TimestampMs,
    ) -> Result<Option<(Position, Position)>> {
        if !(0.0..1.0).contains(&fraction) || fraction <= 0.0 {
            return Err(Error::Validation("partial-close fraction must be in (0, 1)".into()));
        }
        if !is_valid_position_id(&new_position_id) {
            return Err(Error::Validation("invalid position id".into()));
        }

        let Some(_guard) = self.closing.try_claim(position_id).await else {
            return Ok(None);
        };

        let mut original = self
            .positions
            .get(position_id)
            .await?
            .ok_or_else(|| Error::PositionNotFound(position_id.to_string()))?;

        if !original.is_open() {
            return Err(Error::Invariant(format!(
                "position {position_id} was already closed"
            )));
        }

        let closed_size = (original.size as f64 * fraction).round() as Micros;
        let pnl = unrealised_pnl(
            original.entry_price,
            exit_price,
            closed_size,
            original.leverage,
            original.is_long,
        );

        let closed_child = Position {
            id: new_position_id,
            match_id: original.match_id.clone(),
            player_address: original.player_address.clone(),
            asset: original.asset,
            is_long: original.is_long,
            entry_price: original.entry_price,
            size: closed_size,
            leverage: original.leverage,
            sl: original.sl,
            tp: original.tp,
            opened_at: original.opened_at,
            exit_price: Some(exit_price),
            pnl: Some(pnl),
            closed_at: Some(closed_at),
            close_reason: Some(CloseReason::Partial),
        };

        original.size -= closed_size;

        self.positions.set(&closed_child).await?;
        self.positions.set(&original).await?;

        Ok(Some((closed_child, original)))
    }

    pub async fn open_positions_for_match(&self, match_id: &str) -> Result<Vec<Position>> {
        self.positions.find_open_for_match(match_id).await
    }

    pub async fn all_positions_for_match(&self, match_id: &str) -> Result<Vec<Position>> {
        self.positions.find_all_for_match(match_id).await
    }

    pub async fn get(&self, position_id: &str) -> Result<Option<Position>> {
        self.positions.get(position_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_persistence::InMemoryStore;

    fn engine() -> PositionEngine {
        PositionEngine::new(Arc::new(InMemoryStore::new()), ClosingRegistry::new())
    }

    #[tokio::test]
    async fn open_then_close_computes_pnl() {
        let engine = engine();
        engine
            .open_position(
                "pos1".into(),
                "m1".into(),
                "p1".into(),
                Asset::Btc,
                true,
                100_000_000,
                1_000_000,
                10,
                None,
                None,
                0,
            )
            .await
            .unwrap();

        let closed = engine
            .close_position("pos1", 110_000_000, CloseReason::Manual, 1_000)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(closed.pnl, Some(100_000));
        assert!(!closed.is_open());
    }

    #[tokio::test]
    async fn closing_an_already_closed_position_is_an_invariant_error() {
        let engine = engine();
        engine
            .open_position(
                "pos1".into(), "m1".into(), "p1".into(), Asset::Btc, true,
                100_000_000, 1_000_000, 10, None, None, 0,
            )
            .await
            .unwrap();
        engine
            .close_position("pos1", 110_000_000, CloseReason::Manual, 1_000)
            .await
            .unwrap();

        let err = engine
            .close_position("pos1", 110_000_000, CloseReason::Manual, 2_000)
            .await;
        assert!(matches!(err, Err(Error::Invariant(_))));
    }

    #[tokio::test]
    async fn partial_close_splits_size_and_keeps_original_open() {
        let engine = engine();
        engine
            .open_position(
                "pos1".into(), "m1".into(), "p1".into(), Asset::Btc, true,
                100_000_000, 1_000_000, 10, None, None, 0,
            )
            .await
            .unwrap();

        let (child, remaining) = engine
            .partial_close("pos1", "pos1-partial-1".into(), 0.25, 110_000_000, 500)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(child.size, 250_000);
        assert!(!child.is_open());
        assert_eq!(remaining.size, 750_000);
        assert!(remaining.is_open());
    }

    #[tokio::test]
    async fn rejects_out_of_range_fractions() {
        let engine = engine();
        engine
            .open_position(
                "pos1".into(), "m1".into(), "p1".into(), Asset::Btc, true,
                100_000_000, 1_000_000, 10, None, None, 0,
            )
            .await
            .unwrap();
        assert!(engine
            .partial_close("pos1", "child".into(), 0.0, 110_000_000, 500)
            .await
            .is_err());
        assert!(engine
            .partial_close("pos1", "child".into(), 1.0, 110_000_000, 500)
            .await
            .is_err());
    }
}
