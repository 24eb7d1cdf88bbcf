mod challenge;
mod common;
mod ledger;
mod match_;
mod position;
mod price;
mod queue;
mod user;

pub use challenge::{Challenge, ChallengeStatus};
pub use common::{
    is_allowed_bet, Addr, Asset, MatchDuration, Micros, TimestampMs, ALLOWED_BETS_MICROS,
};
pub use ledger::{BalanceEvent, BalanceEventKind, BalanceView, LedgerEntry};
pub use match_::{Match, MatchStatus};
pub use position::{is_valid_position_id, CloseReason, Position};
pub use price::PriceSnapshot;
pub use queue::{QueueEntry, QueueKey};
pub use user::{sanitize_gamer_tag, strip_control_chars, validate_gamer_tag, User, UserStats};
