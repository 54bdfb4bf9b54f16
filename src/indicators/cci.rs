// =============================================================================
// Commodity Channel Index (20)
// =============================================================================
//
//   TP  = (H + L + C) / 3
//   CCI = (TP - SMA(TP, n)) / (0.015 * mean deviation)
//
// ±100 are the conventional overbought / oversold rails.
// =============================================================================

use crate::market_data::Candle;

/// Most recent CCI over `period` bars.
pub fn cci(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let typical: Vec<f64> = candles[candles.len() - period..]
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let mean = typical.iter().sum::<f64>() / period as f64;
    let mean_dev = typical.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;

    if !mean.is_finite() || !mean_dev.is_finite() {
        return None;
    }
    if mean_dev == 0.0 {
        // Perfectly flat window — no deviation to normalise against.
        return Some(0.0);
    }

    let last_tp = *typical.last()?;
    let value = (last_tp - mean) / (0.015 * mean_dev);
    value.is_finite().then_some(value)
}
