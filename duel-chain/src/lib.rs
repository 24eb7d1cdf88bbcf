mod chain;
mod mock;
mod types;

pub use chain::ChainT;
pub use mock::{MockChain, SharedMockChain};
pub use types::{EndGameParams, GamePda, OnChainGameState, OnChainGameStatus};
