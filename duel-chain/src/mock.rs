use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use duel_core::types::{Addr, Match, Micros};
use duel_core::Result;

use crate::chain::ChainT;
use crate::types::{EndGameParams, GamePda, OnChainGameState, OnChainGameStatus};

/// An in-process chain emulator, standing in for a real RPC-backed
/// collaborator — it emulates the behavior of the blockchain counterpart
/// for local testing and development, without a jsonrpsee/sqlite surface,
/// since `duel-chain` is consumed in-process rather than over the wire.
pub struct MockChain {
    games: Mutex<HashMap<String, OnChainGameStatus>>,
    profiles: Mutex<HashMap<Addr, bool>>,
    payouts: Mutex<Vec<String>>,
    withdrawals: Mutex<Vec<(Addr, Micros)>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            games: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            payouts: Mutex::new(Vec::new()),
            withdrawals: Mutex::new(Vec::new()),
        }
    }

    pub async fn seed_profile(&self, address: &Addr) {
        self.profiles.lock().await.insert(address.clone(), true);
    }

    pub async fn payouts(&self) -> Vec<String> {
        self.payouts.lock().await.clone()
    }

    pub async fn withdrawals(&self) -> Vec<(Addr, Micros)> {
        self.withdrawals.lock().await.clone()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainT for MockChain {
    async fn fetch_game_account(&self, game_id: &str) -> Result<OnChainGameStatus> {
        Ok(self
            .games
            .lock()
            .await
            .get(game_id)
            .cloned()
            .unwrap_or(OnChainGameStatus {
                status: OnChainGameState::Open,
                winner: None,
            }))
    }

    async fn end_game_on_chain(&self, params: EndGameParams) -> Result<String> {
        info!(
            "Recording on-chain settlement for {} (forfeit={})",
            params.game_id, params.is_forfeit
        );
        self.games.lock().await.insert(
            params.game_id.clone(),
            OnChainGameStatus {
                status: OnChainGameState::Settled,
                winner: params.winner,
            },
        );
        Ok(format!("mock-tx-{}", params.game_id))
    }

    async fn process_match_payout(&self, match_id: &str, _m: &Match) -> Result<()> {
        self.payouts.lock().await.push(match_id.to_string());
        Ok(())
    }

    async fn player_profile_exists(&self, address: &Addr) -> Result<bool> {
        Ok(self.profiles.lock().await.get(address).copied().unwrap_or(false))
    }

    async fn get_platform_pda(&self) -> Result<String> {
        Ok("mock-platform-pda".into())
    }

    async fn get_game_pda_and_escrow(&self, game_id: &str) -> Result<GamePda> {
        Ok(GamePda {
            game_pda: format!("mock-game-pda-{game_id}"),
            escrow_pda: format!("mock-escrow-pda-{game_id}"),
        })
    }

    async fn get_player_profile_pda(&self, address: &Addr) -> Result<String> {
        Ok(format!("mock-profile-pda-{address}"))
    }

    async fn transfer_usdc(&self, address: &Addr, amount: Micros) -> Result<String> {
        info!("Transferring {} micros USDC to {}", amount, address);
        self.withdrawals.lock().await.push((address.clone(), amount));
        Ok(format!("mock-tx-withdrawal-{address}"))
    }
}

pub type SharedMockChain = Arc<MockChain>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_game_then_fetch_reflects_the_settlement() {
        let chain = MockChain::new();
        chain
            .end_game_on_chain(EndGameParams {
                game_id: "m1".into(),
                winner: Some("p1".into()),
                player1_pnl_bps: 500,
                player2_pnl_bps: -500,
                is_forfeit: false,
            })
            .await
            .unwrap();

        let status = chain.fetch_game_account("m1").await.unwrap();
        assert_eq!(status.status, OnChainGameState::Settled);
        assert_eq!(status.winner, Some("p1".to_string()));
    }

    #[tokio::test]
    async fn unknown_game_is_reported_open() {
        let chain = MockChain::new();
        let status = chain.fetch_game_account("unknown").await.unwrap();
        assert_eq!(status.status, OnChainGameState::Open);
    }
}
