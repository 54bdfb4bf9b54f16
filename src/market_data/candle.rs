// =============================================================================
// Core market data records: ticks and OHLC candles
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single price observation from the market-data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    /// UNIX epoch in seconds.
    pub epoch: i64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, price: f64, epoch: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            epoch,
        }
    }

    /// A tick is well-formed when its price is a positive finite number and
    /// its epoch is positive. Anything else is dropped by the aggregator.
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite() && self.price > 0.0 && self.epoch > 0
    }
}

/// One OHLC candle of a `(symbol, timeframe)` series.
///
/// Invariants maintained by the aggregator:
/// - `low <= min(open, close)` and `max(open, close) <= high`
/// - `tick_count >= 1`
/// - `start_epoch` is a multiple of `timeframe_secs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe_secs: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// UNIX epoch (seconds) of the bucket start.
    pub start_epoch: i64,
    /// Number of ticks aggregated into this candle. Seeded history candles
    /// carry 1 (the provider does not report per-candle tick totals).
    pub tick_count: u64,
    pub is_forming: bool,
}

impl Candle {
    /// Open a fresh forming candle from the first tick of a bucket.
    pub fn open_from_tick(tick: &Tick, timeframe_secs: u32, start_epoch: i64) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            timeframe_secs,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            start_epoch,
            tick_count: 1,
            is_forming: true,
        }
    }

    /// Fold one more tick of the same bucket into this candle.
    pub fn apply_tick(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.price);
        self.low = self.low.min(tick.price);
        self.close = tick.price;
        self.tick_count += 1;
    }

    /// Epoch (seconds) at which this candle's bucket closes.
    pub fn close_epoch(&self) -> i64 {
        self.start_epoch + self.timeframe_secs as i64
    }

    /// Full bar range. Zero for a single-price candle.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// True when the candle closed above its open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// True when the candle closed below its open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// OHLC consistency check: `low <= open, close <= high`.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}
