mod oracle;
mod source;

pub use oracle::{run_price_feed, PriceOracle};
pub use source::{PriceSourceT, SyntheticPriceSource};
