//! Tunable constants named directly in spec §4/§8. Defaults only — the
//! live values come from `duel-env::Config` at the server composition root.

/// A price older than this is considered stale.
pub const PRICE_MAX_AGE_MS: u64 = 10_000;

/// Grace period before a disconnected player forfeits.
pub const FORFEIT_GRACE_MS: u64 = 60_000;

/// First-message deadline for a freshly accepted WS connection.
pub const AUTH_TIMEOUT_MS: u64 = 5_000;

/// Heartbeat ping cadence.
pub const WS_PING_INTERVAL_MS: u64 = 15_000;

/// How long a client has to pong before the connection is dropped.
pub const PONG_TIMEOUT_MS: u64 = 10_000;

/// Sliding window rate limiter: max messages ...
pub const WS_RATE_LIMIT_MAX: u32 = 30;
/// ... per this many milliseconds.
pub const WS_RATE_LIMIT_WINDOW_MS: u64 = 10_000;

/// Maximum accepted WS frame size, in bytes.
pub const WS_MAX_MESSAGE_BYTES: usize = 16 * 1024;

/// Maximum simultaneous WS connections for one authenticated user.
pub const MAX_CONNECTIONS_PER_USER: usize = 5;

/// Broadcast loop cadence (price_update / opponent_update / spectator_update).
pub const OPPONENT_BROADCAST_INTERVAL_MS: u64 = 2_000;

/// Price oracle fetch-loop cadence (§4.1).
pub const PRICE_FEED_INTERVAL_MS: u64 = 1_000;

/// Auto-close loop cadence (SL/TP/liquidation evaluation).
pub const SETTLEMENT_INTERVAL_MS: u64 = 750;

/// ROI-equality tolerance below which a match is a tie (Open Question 4).
pub const TIE_EPS: f64 = 0.00001;

/// Per-match virtual trading capital, in USD micros (1_000_000 == $1).
pub const DEMO_BALANCE_MICROS: i64 = 10_000_000_000; // $10,000

/// Platform rake taken from the loser's bet, in basis points.
pub const RAKE_BPS: i64 = 500; // 5%

/// Max chat message length, in chars, after control-char stripping.
pub const CHAT_MAX_LENGTH: usize = 280;

/// Stale-match detection window past `endTime` (Open Question 2 / §4.12).
pub const ACTIVE_STALE_MS: u64 = 5 * 60_000;
/// Stale-match detection window past `depositDeadline`.
pub const DEPOSIT_STALE_MS: u64 = 5 * 60_000;

/// Challenge expiry window from creation.
pub const CHALLENGE_EXPIRY_MS: u64 = 5 * 60_000;
/// Admin challenge-expiry sweep cadence (Open Question 3).
pub const CHALLENGE_EXPIRY_SWEEP_MS: u64 = 60_000;

/// Settlement-retry admin loop cadence.
pub const SETTLEMENT_RETRY_SWEEP_MS: u64 = 30_000;

/// Ledger address the platform rake is credited to on every non-tied
/// settlement, so "vault balance" and "withdraw rake" (§6.1) have somewhere
/// concrete to read from and debit.
pub const PLATFORM_VAULT_ADDR: &str = "platform-vault";
