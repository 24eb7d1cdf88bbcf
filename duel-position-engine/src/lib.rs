mod closing_guard;
mod engine;
mod math;

pub use closing_guard::{ClosingGuard, ClosingRegistry};
pub use engine::PositionEngine;
pub use math::{liquidation_price, roi, roi_for_display, unrealised_pnl};
