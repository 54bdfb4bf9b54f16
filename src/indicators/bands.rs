// =============================================================================
// Price Envelopes — Bollinger (20, 2σ), Keltner (20, 2·ATR), Donchian (20)
// =============================================================================
//
// Bollinger: SMA ± mult * population standard deviation of closes.
// Keltner:   EMA ± mult * ATR over the same period.
// Donchian:  highest high / lowest low of the window.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

use super::atr::atr;
use super::ema::{latest_ema, sma};

/// Upper / middle / lower envelope triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    /// Band width normalised by the middle band; the squeeze measure.
    pub fn bandwidth(&self) -> Option<f64> {
        if self.middle == 0.0 {
            return None;
        }
        let bw = (self.upper - self.lower) / self.middle;
        bw.is_finite().then_some(bw)
    }
}

/// Donchian channel extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DonchianChannel {
    pub upper: f64,
    pub lower: f64,
}

/// Bollinger Bands over the last `period` closes.
pub fn bollinger(closes: &[f64], period: usize, mult: f64) -> Option<Bands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = sma(closes, period)?;
    let variance = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();
    if !std_dev.is_finite() {
        return None;
    }

    Some(Bands {
        upper: middle + mult * std_dev,
        middle,
        lower: middle - mult * std_dev,
    })
}

/// Keltner Channels: EMA mid-line with an ATR envelope.
pub fn keltner(candles: &[Candle], period: usize, atr_mult: f64) -> Option<Bands> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let middle = latest_ema(&closes, period)?;
    let atr_val = atr(candles, period)?;

    Some(Bands {
        upper: middle + atr_mult * atr_val,
        middle,
        lower: middle - atr_mult * atr_val,
    })
}

/// Donchian channel over the last `period` bars.
pub fn donchian(candles: &[Candle], period: usize) -> Option<DonchianChannel> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let upper = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lower = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if !upper.is_finite() || !lower.is_finite() {
        return None;
    }
    Some(DonchianChannel { upper, lower })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "EURUSD".into(),
            timeframe_secs: 60,
            open: (high + low) / 2.0,
            high,
            low,
            close,
            start_epoch: 0,
            tick_count: 3,
            is_forming: false,
        }
    }

    #[test]
    fn bollinger_flat_series_collapses() {
        let closes = vec![100.0; 30];
        let b = bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(b.upper, 100.0);
        assert_eq!(b.middle, 100.0);
        assert_eq!(b.lower, 100.0);
        assert_eq!(b.bandwidth(), Some(0.0));
    }

    #[test]
    fn bollinger_ordering_and_symmetry() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 5) as f64).collect();
        let b = bollinger(&closes, 20, 2.0).unwrap();
        assert!(b.lower < b.middle && b.middle < b.upper);
        assert!(((b.upper - b.middle) - (b.middle - b.lower)).abs() < 1e-9);
    }

    #[test]
    fn bollinger_insufficient_data() {
        assert!(bollinger(&[1.0; 19], 20, 2.0).is_none());
    }

    #[test]
    fn bandwidth_zero_middle_is_none() {
        let b = Bands {
            upper: 1.0,
            middle: 0.0,
            lower: -1.0,
        };
        assert!(b.bandwidth().is_none());
    }

    #[test]
    fn keltner_envelope_contains_ema() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.2;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect();
        let k = keltner(&candles, 20, 2.0).unwrap();
        assert!(k.lower < k.middle && k.middle < k.upper);
    }

    #[test]
    fn keltner_insufficient_data() {
        let candles = vec![candle(101.0, 99.0, 100.0); 20];
        assert!(keltner(&candles, 20, 2.0).is_none());
    }

    #[test]
    fn donchian_extremes() {
        let mut candles = vec![candle(105.0, 95.0, 100.0); 25];
        candles.push(candle(120.0, 98.0, 110.0));
        let d = donchian(&candles, 20).unwrap();
        assert_eq!(d.upper, 120.0);
        assert_eq!(d.lower, 95.0);
        assert!(donchian(&candles[..10], 20).is_none());
    }
}
