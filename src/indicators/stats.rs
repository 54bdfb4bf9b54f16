// =============================================================================
// Statistical Measures — Z-score, linear-regression slope, range percentile
// =============================================================================

use crate::market_data::Candle;

/// Mean-reversion Z-score of the latest close against the last `period`
/// closes (population standard deviation).
pub fn zscore(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    if !std_dev.is_finite() {
        return None;
    }
    if std_dev == 0.0 {
        return Some(0.0);
    }

    let z = (window.last()? - mean) / std_dev;
    z.is_finite().then_some(z)
}

/// Ordinary least-squares slope of the last `period` closes against their
/// bar index (price units per bar).
pub fn linreg_slope(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let n = period as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = window.iter().sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in window.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }

    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    slope.is_finite().then_some(slope)
}

/// Percentile rank of the latest bar's high-low range within the trailing
/// `period` ranges (inclusive of itself), in [0, 1].
pub fn range_percentile(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let last_range = window.last()?.range();
    if !last_range.is_finite() {
        return None;
    }

    let below = window.iter().filter(|c| c.range() <= last_range).count();
    Some(below as f64 / period as f64)
}
