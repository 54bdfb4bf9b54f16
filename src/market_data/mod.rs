pub mod aggregator;
pub mod candle;

// Re-export the core records for convenient access
// (e.g. `use crate::market_data::Candle`).
pub use aggregator::{CandleAggregator, WindowKey};
pub use candle::{Candle, Tick};
