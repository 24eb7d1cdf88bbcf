use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds shared across every layer of the duel engine.
///
/// Variants are grouped per §7: validation, auth, permission, not-found,
/// conflict, resource exhaustion, stale-data, transient-external, and
/// invariant breaks. Transport-level mapping (HTTP status codes, WS close
/// codes) happens only at the `duel-server` boundary; this enum stays
/// transport-agnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("price is stale")]
    PriceStale,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("position is already being closed")]
    AlreadyClosing,

    #[error("signature already used")]
    DuplicateDepositSignature,

    #[error("already in queue for this duration/bet")]
    AlreadyQueued,

    #[error("too many connections for this user")]
    TooManyConnections,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("message too large")]
    MessageTooLarge,

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("match is not active")]
    MatchNotActive,

    #[error("player is not part of this match")]
    NotAPlayer,

    #[error("spectators cannot perform gameplay actions")]
    SpectatorForbidden,

    #[error("on-chain call failed: {0}")]
    TransientExternal(String),

    #[error("recoverable: {0}")]
    Recoverable(String),

    #[error("internal invariant broken: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Validation(format!("malformed json: {e}"))
    }
}
