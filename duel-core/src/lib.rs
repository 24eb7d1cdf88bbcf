//! Shared types, errors and constants used by every `duel-*` crate.

pub mod auth;
pub mod constants;
pub mod error;
pub mod time;
pub mod types;

pub use error::{Error, Result};
pub use time::now_ms;
