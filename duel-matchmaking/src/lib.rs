mod matchmaking;

pub use matchmaking::{JoinQueueOutcome, Matchmaking};
