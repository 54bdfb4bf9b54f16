// =============================================================================
// Average True Range — Wilder's smoothing, plus ATR bands
// =============================================================================
//
// True Range per bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR seeds with the SMA of the first `period` TR values, then:
//   ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// True Range values for consecutive candle pairs (one fewer than the input).
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let high = pair[1].high;
            let low = pair[1].low;
            let prev_close = pair[0].close;
            (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs())
        })
        .collect()
}

/// Most recent ATR value. Needs `period + 1` candles for `period` TR values.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let trs = true_ranges(candles);
    let seed: f64 = trs[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let period_f = period as f64;
    let mut value = seed;
    for &tr in &trs[period..] {
        value = (value * (period_f - 1.0) + tr) / period_f;
        if !value.is_finite() {
            return None;
        }
    }

    Some(value)
}

/// Price envelope at `close ± mult * ATR`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// ATR bands around the latest close (default span 2 ATR).
pub fn atr_bands(candles: &[Candle], period: usize, mult: f64) -> Option<AtrBands> {
    let atr_val = atr(candles, period)?;
    let close = candles.last()?.close;
    Some(AtrBands {
        upper: close + mult * atr_val,
        middle: close,
        lower: close - mult * atr_val,
    })
}
