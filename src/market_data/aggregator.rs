// =============================================================================
// CandleAggregator — tick-to-candle bucketing per (symbol, timeframe)
// =============================================================================
//
// Owns every candle window in the process. Each window holds a bounded ring
// of closed candles plus at most one forming candle for the current bucket.
// A tick whose epoch reaches the next bucket boundary closes the forming
// candle and opens a fresh one; buckets with no ticks are simply skipped.
//
// All mutation is serialised behind one RwLock; getters hand out copies so
// readers never observe a half-applied tick.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::candle::{Candle, Tick};

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct WindowKey {
    pub symbol: String,
    pub timeframe_secs: u32,
}

impl WindowKey {
    pub fn new(symbol: impl Into<String>, timeframe_secs: u32) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe_secs,
        }
    }
}

impl std::fmt::Display for WindowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}s", self.symbol, self.timeframe_secs)
    }
}

/// Closed-candle capacity used when a window is created implicitly by the
/// first tick, before any explicit `initialize`.
const DEFAULT_CAPACITY: usize = 500;

/// Recent forming-candle tick prices retained for tick-scale volatility.
const FORMING_TICK_TAIL: usize = 32;

/// One (symbol, timeframe) window: closed ring + forming candle + the tail of
/// tick prices inside the forming candle.
struct CandleWindow {
    closed: VecDeque<Candle>,
    forming: Option<Candle>,
    capacity: usize,
    forming_ticks: VecDeque<f64>,
}

impl CandleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            closed: VecDeque::with_capacity(capacity + 1),
            forming: None,
            capacity,
            forming_ticks: VecDeque::with_capacity(FORMING_TICK_TAIL),
        }
    }

    fn push_closed(&mut self, candle: Candle) {
        self.closed.push_back(candle);
        while self.closed.len() > self.capacity {
            self.closed.pop_front();
        }
    }

    fn push_forming_tick(&mut self, price: f64) {
        self.forming_ticks.push_back(price);
        while self.forming_ticks.len() > FORMING_TICK_TAIL {
            self.forming_ticks.pop_front();
        }
    }
}

/// Thread-safe store of candle windows keyed by `(symbol, timeframe)`.
pub struct CandleAggregator {
    windows: RwLock<HashMap<WindowKey, CandleWindow>>,
    /// Ticks dropped for being malformed (non-finite or non-positive price,
    /// non-positive epoch). Exposed for observability.
    malformed_ticks: AtomicU64,
}

impl CandleAggregator {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            malformed_ticks: AtomicU64::new(0),
        }
    }

    /// Seed the closed-candle buffer for a window from fetched history.
    /// Any forming candle is cleared; only the newest `capacity` candles are
    /// retained.
    pub fn initialize(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        history: Vec<Candle>,
        capacity: usize,
    ) {
        let key = WindowKey::new(symbol, timeframe_secs);
        let mut map = self.windows.write();
        let window = map
            .entry(key)
            .and_modify(|w| w.capacity = capacity)
            .or_insert_with(|| CandleWindow::new(capacity));

        window.closed.clear();
        window.forming = None;
        window.forming_ticks.clear();

        for mut candle in history {
            candle.is_forming = false;
            window.push_closed(candle);
        }

        debug!(
            symbol,
            timeframe_secs,
            candles = window.closed.len(),
            "candle window seeded"
        );
    }

    /// Fold one tick into the window for `(tick.symbol, timeframe_secs)`.
    ///
    /// Bucketing policy:
    /// - `bucket = floor(epoch / timeframe) * timeframe`
    /// - same bucket as the forming candle: update OHLC in place
    /// - later bucket: close the forming candle, open a fresh one (skipped
    ///   buckets are not back-filled)
    /// - earlier bucket (out-of-order tick): ignore
    ///
    /// A tick exactly at `bucket + timeframe` starts the next bucket.
    pub fn process_tick(&self, tick: &Tick, timeframe_secs: u32) {
        if !tick.is_well_formed() {
            self.malformed_ticks.fetch_add(1, Ordering::Relaxed);
            debug!(symbol = %tick.symbol, price = tick.price, epoch = tick.epoch, "malformed tick dropped");
            return;
        }

        let tf = timeframe_secs as i64;
        let bucket = tick.epoch.div_euclid(tf) * tf;

        let key = WindowKey::new(tick.symbol.clone(), timeframe_secs);
        let mut map = self.windows.write();
        let window = map
            .entry(key)
            .or_insert_with(|| CandleWindow::new(DEFAULT_CAPACITY));

        match window.forming.as_mut() {
            None => {
                window.forming = Some(Candle::open_from_tick(tick, timeframe_secs, bucket));
                window.forming_ticks.clear();
                window.push_forming_tick(tick.price);
            }
            Some(forming) if bucket == forming.start_epoch => {
                forming.apply_tick(tick);
                window.push_forming_tick(tick.price);
            }
            Some(forming) if bucket > forming.start_epoch => {
                let mut finished = forming.clone();
                finished.is_forming = false;
                window.push_closed(finished);

                window.forming = Some(Candle::open_from_tick(tick, timeframe_secs, bucket));
                window.forming_ticks.clear();
                window.push_forming_tick(tick.price);
            }
            Some(forming) => {
                // Out-of-order tick for an already-closed bucket.
                debug!(
                    symbol = %tick.symbol,
                    tick_bucket = bucket,
                    forming_bucket = forming.start_epoch,
                    "out-of-order tick ignored"
                );
            }
        }
    }

    /// Snapshot of the closed candles for a window, oldest first.
    pub fn get_closed_candles(&self, symbol: &str, timeframe_secs: u32) -> Vec<Candle> {
        let key = WindowKey::new(symbol, timeframe_secs);
        let map = self.windows.read();
        map.get(&key)
            .map(|w| w.closed.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the forming candle, if any.
    pub fn get_forming_candle(&self, symbol: &str, timeframe_secs: u32) -> Option<Candle> {
        let key = WindowKey::new(symbol, timeframe_secs);
        let map = self.windows.read();
        map.get(&key).and_then(|w| w.forming.clone())
    }

    /// The most recent `count` tick prices of the forming candle, oldest
    /// first. Empty when the window or forming candle is absent.
    pub fn recent_forming_ticks(&self, symbol: &str, timeframe_secs: u32, count: usize) -> Vec<f64> {
        let key = WindowKey::new(symbol, timeframe_secs);
        let map = self.windows.read();
        match map.get(&key) {
            Some(w) => {
                let start = w.forming_ticks.len().saturating_sub(count);
                w.forming_ticks.iter().skip(start).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// Drop the window for `(symbol, timeframe)` entirely.
    pub fn cleanup(&self, symbol: &str, timeframe_secs: u32) {
        let key = WindowKey::new(symbol, timeframe_secs);
        self.windows.write().remove(&key);
    }

    /// Total malformed ticks dropped since process start.
    pub fn malformed_tick_count(&self) -> u64 {
        self.malformed_ticks.load(Ordering::Relaxed)
    }
}

impl Default for CandleAggregator {
    fn default() -> Self {
        Self::new()
    }
}
