mod protocol;
mod rate_limiter;
mod registry;

pub use protocol::{ClientMessage, ServerMessage, SpectatorAggregate, SpectatorPosition};
pub use rate_limiter::RateLimiter;
pub use registry::SessionRegistry;
