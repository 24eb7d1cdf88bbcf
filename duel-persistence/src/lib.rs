//! Path-addressed persistence collaborator (§4.3) plus typed repositories
//! built on top of it.

mod memory;
mod repos;
mod trait_;

pub use memory::InMemoryStore;
pub use repos::{
    BalanceEventRepo, ChallengeRepo, LedgerRepo, MatchRepo, PositionRepo, QueueRepo, UserRepo,
};
pub use trait_::{PersistenceT, QueryRow};
