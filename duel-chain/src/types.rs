use duel_core::types::Addr;

/// Mirrors the on-chain game account's settlement-relevant fields (§6.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainGameStatus {
    pub status: OnChainGameState,
    pub winner: Option<Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainGameState {
    Open,
    Settled,
    Closed,
}

/// A settled match's result, addressed by basis points of PnL on the bet
/// rather than raw PnL, so on-chain payout math stays integer and
/// currency-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndGameParams {
    pub game_id: String,
    pub winner: Option<Addr>,
    pub player1_pnl_bps: i64,
    pub player2_pnl_bps: i64,
    pub is_forfeit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePda {
    pub game_pda: String,
    pub escrow_pda: String,
}
