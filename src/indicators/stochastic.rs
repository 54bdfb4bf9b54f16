// =============================================================================
// Stochastic Oscillator %K(14, 3) / %D(3) and Williams %R(14)
// =============================================================================
//
//   raw %K = 100 * (C - LL_n) / (HH_n - LL_n)
//   %K     = SMA(3) of raw %K
//   %D     = SMA(3) of %K
//
//   Williams %R = -100 * (HH_n - C) / (HH_n - LL_n)  — the mirrored cousin.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// Smoothed stochastic pair plus the previous bar's pair for cross
/// detection. The previous pair is absent on the very first smoothed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_d: Option<f64>,
}

/// Most recent stochastic %K/%D with standard (14, 3, 3) parameters.
pub fn stochastic(candles: &[Candle]) -> Option<Stochastic> {
    stochastic_with(candles, 14, 3, 3)
}

/// Stochastic with explicit look-back and smoothing periods.
pub fn stochastic_with(
    candles: &[Candle],
    period: usize,
    k_smooth: usize,
    d_smooth: usize,
) -> Option<Stochastic> {
    if period == 0 || k_smooth == 0 || d_smooth == 0 {
        return None;
    }
    // raw %K needs `period` bars; %K consumes k_smooth raws; %D consumes
    // d_smooth %K values.
    let needed = period + k_smooth + d_smooth - 2;
    if candles.len() < needed {
        return None;
    }

    let raw: Vec<f64> = (period..=candles.len())
        .map(|end| raw_k(&candles[end - period..end]))
        .collect::<Option<Vec<f64>>>()?;

    let k_series: Vec<f64> = raw
        .windows(k_smooth)
        .map(|w| w.iter().sum::<f64>() / k_smooth as f64)
        .collect();

    let d_series: Vec<f64> = k_series
        .windows(d_smooth)
        .map(|w| w.iter().sum::<f64>() / d_smooth as f64)
        .collect();

    let k = *k_series.last()?;
    let d = *d_series.last()?;

    let prev_k = (k_series.len() >= 2).then(|| k_series[k_series.len() - 2]);
    let prev_d = (d_series.len() >= 2).then(|| d_series[d_series.len() - 2]);

    Some(Stochastic {
        k,
        d,
        prev_k,
        prev_d,
    })
}

fn raw_k(window: &[Candle]) -> Option<f64> {
    let close = window.last()?.close;
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if !range.is_finite() {
        return None;
    }
    if range == 0.0 {
        // Flat window: mid-scale by convention.
        return Some(50.0);
    }
    let k = 100.0 * (close - lowest) / range;
    k.is_finite().then_some(k)
}

/// Williams %R over `period` bars, in [-100, 0].
pub fn williams_r(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let close = window.last()?.close;
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if !range.is_finite() {
        return None;
    }
    if range == 0.0 {
        return Some(-50.0);
    }
    let r = -100.0 * (highest - close) / range;
    r.is_finite().then_some(r)
}
