use async_trait::async_trait;

use duel_core::types::{Addr, Match, Micros};
use duel_core::Result;

use crate::types::{EndGameParams, GamePda, OnChainGameStatus};

/// The on-chain collaborator (§6.4). All methods are external calls in a
/// real deployment; the core engine only ever observes their outcome and
/// never signs transactions itself, the same boundary `TransportT`-style
/// traits draw between an engine and its chain adapter.
#[async_trait]
pub trait ChainT: Send + Sync {
    /// Fetches the current on-chain status of a settled or in-flight game.
    ///
    /// # Returns
    /// * [`duel_core::Error::TransientExternal`] when the RPC call fails or
    ///   times out; callers should retry rather than treat this as a
    ///   not-found.
    async fn fetch_game_account(&self, game_id: &str) -> Result<OnChainGameStatus>;

    /// Submits the final match outcome for settlement.
    ///
    /// # Returns the transaction signature on success.
    async fn end_game_on_chain(&self, params: EndGameParams) -> Result<String>;

    /// Pays out escrowed funds per the settled `Match`. Distinct from
    /// `end_game_on_chain` because payout can be retried independently of
    /// the settlement record (§4.11).
    async fn process_match_payout(&self, match_id: &str, m: &Match) -> Result<()>;

    /// Whether `address` already has an on-chain player profile.
    async fn player_profile_exists(&self, address: &Addr) -> Result<bool>;

    async fn get_platform_pda(&self) -> Result<String>;

    async fn get_game_pda_and_escrow(&self, game_id: &str) -> Result<GamePda>;

    async fn get_player_profile_pda(&self, address: &Addr) -> Result<String>;

    /// Submits a USDC transfer out of the platform vault to `address`
    /// (§1, §4.2's withdrawal flow). Distinct from `end_game_on_chain`,
    /// which settles a match rather than moving funds to a player.
    ///
    /// # Returns the transaction signature on success.
    async fn transfer_usdc(&self, address: &Addr, amount: Micros) -> Result<String>;
}
