// =============================================================================
// MACD — Moving Average Convergence / Divergence (12, 26, 9)
// =============================================================================
//
//   macd      = EMA(12) - EMA(26)
//   signal    = EMA(9) of the macd line
//   histogram = macd - signal
// =============================================================================

use serde::{Deserialize, Serialize};

use super::ema::ema_series;

/// The MACD triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD triple with the standard (12, 26, 9)
/// parameters. Needs at least `26 + 9 - 1 = 34` closes so that the signal
/// EMA has a full seed.
pub fn macd(closes: &[f64]) -> Option<Macd> {
    macd_with(closes, 12, 26, 9)
}

/// MACD with explicit periods. `slow` must exceed `fast`.
pub fn macd_with(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast == 0 || signal == 0 || slow <= fast {
        return None;
    }
    if closes.len() < slow + signal - 1 {
        return None;
    }

    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    if slow_series.is_empty() {
        return None;
    }

    // The slow series starts `slow - fast` entries into the fast series;
    // align both to the slow start.
    let offset = slow - fast;
    let line: Vec<f64> = slow_series
        .iter()
        .enumerate()
        .filter_map(|(i, &s)| fast_series.get(i + offset).map(|&f| f - s))
        .collect();

    let signal_series = ema_series(&line, signal);
    let sig = *signal_series.last()?;
    let macd_val = *line.last()?;

    if !macd_val.is_finite() || !sig.is_finite() {
        return None;
    }

    Some(Macd {
        macd: macd_val,
        signal: sig,
        histogram: macd_val - sig,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn macd_insufficient_data() {
        assert!(macd(&ascending(33)).is_none());
        assert!(macd(&ascending(34)).is_some());
    }

    #[test]
    fn macd_rejects_bad_periods() {
        let closes = ascending(100);
        assert!(macd_with(&closes, 26, 12, 9).is_none());
        assert!(macd_with(&closes, 12, 12, 9).is_none());
        assert!(macd_with(&closes, 0, 26, 9).is_none());
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let m = macd(&ascending(120)).unwrap();
        // In a steady uptrend the fast EMA sits above the slow EMA.
        assert!(m.macd > 0.0);
        assert!((m.histogram - (m.macd - m.signal)).abs() < 1e-12);
    }

    #[test]
    fn macd_negative_in_downtrend() {
        let closes: Vec<f64> = (1..=120).rev().map(|i| i as f64).collect();
        let m = macd(&closes).unwrap();
        assert!(m.macd < 0.0);
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![42.0; 100];
        let m = macd(&closes).unwrap();
        assert!(m.macd.abs() < 1e-9);
        assert!(m.signal.abs() < 1e-9);
        assert!(m.histogram.abs() < 1e-9);
    }
}
