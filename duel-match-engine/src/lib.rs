//! Per-match actor: the single serialisation point for gameplay commands,
//! price/opponent broadcast ticks, SL/TP/liquidation auto-close, and the
//! forfeit timer (§4.4-§4.10), plus the registry that lazily spawns and
//! reaps one actor per live match.

mod actor;
mod command;
mod registry;
mod spectator;

pub use actor::MatchActor;
pub use command::{JoinMatchReply, MatchCommand, MatchDeps, MatchHandle};
pub use registry::MatchRegistry;
pub use spectator::build_spectator_view;
