// =============================================================================
// Volume-Weighted Measures — VWAP, OBV, Chaikin Oscillator
// =============================================================================
//
// Ticks carry price only, so candle `tick_count` stands in for volume. That
// keeps the relative weighting meaningful (busier candles count for more)
// without inventing quote sizes.
//
// VWAP is rolling over the supplied window; there is no session/day reset.
// =============================================================================

use crate::market_data::Candle;

use super::ema::ema_series;

fn volume_of(candle: &Candle) -> f64 {
    candle.tick_count as f64
}

/// Volume-weighted average price over the whole window.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }

    let mut pv = 0.0;
    let mut vol = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        let v = volume_of(c);
        pv += typical * v;
        vol += v;
    }

    if vol <= 0.0 {
        return None;
    }
    let value = pv / vol;
    value.is_finite().then_some(value)
}

/// On-Balance Volume: cumulative signed volume by close-to-close direction.
pub fn obv(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 2 {
        return None;
    }

    let mut total = 0.0;
    for pair in candles.windows(2) {
        let v = volume_of(&pair[1]);
        if pair[1].close > pair[0].close {
            total += v;
        } else if pair[1].close < pair[0].close {
            total -= v;
        }
    }
    total.is_finite().then_some(total)
}

/// Chaikin Oscillator: EMA(3) - EMA(10) of the accumulation/distribution
/// line. Needs at least 10 bars for the slow EMA seed.
pub fn chaikin_oscillator(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 10 {
        return None;
    }

    let mut adl = Vec::with_capacity(candles.len());
    let mut running = 0.0;
    for c in candles {
        let range = c.high - c.low;
        let mfm = if range > 0.0 {
            ((c.close - c.low) - (c.high - c.close)) / range
        } else {
            0.0
        };
        running += mfm * volume_of(c);
        adl.push(running);
    }

    let fast = *ema_series(&adl, 3).last()?;
    let slow = *ema_series(&adl, 10).last()?;
    let value = fast - slow;
    value.is_finite().then_some(value)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle_v(high: f64, low: f64, close: f64, ticks: u64) -> Candle {
        Candle {
            symbol: "EURUSD".into(),
            timeframe_secs: 60,
            open: (high + low) / 2.0,
            high,
            low,
            close,
            start_epoch: 0,
            tick_count: ticks,
            is_forming: false,
        }
    }

    #[test]
    fn vwap_single_flat_candle() {
        let candles = vec![candle_v(100.0, 100.0, 100.0, 10)];
        assert_eq!(vwap(&candles), Some(100.0));
        assert!(vwap(&[]).is_none());
    }

    #[test]
    fn vwap_weights_by_tick_count() {
        // Typical prices 100 (weight 1) and 200 (weight 3) => 175.
        let candles = vec![
            candle_v(100.0, 100.0, 100.0, 1),
            candle_v(200.0, 200.0, 200.0, 3),
        ];
        assert!((vwap(&candles).unwrap() - 175.0).abs() < 1e-9);
    }

    #[test]
    fn obv_direction() {
        let rising = vec![
            candle_v(101.0, 99.0, 100.0, 5),
            candle_v(102.0, 100.0, 101.0, 5),
            candle_v(103.0, 101.0, 102.0, 5),
        ];
        assert_eq!(obv(&rising), Some(10.0));

        let falling = vec![
            candle_v(103.0, 101.0, 102.0, 5),
            candle_v(102.0, 100.0, 101.0, 5),
            candle_v(101.0, 99.0, 100.0, 5),
        ];
        assert_eq!(obv(&falling), Some(-10.0));

        assert!(obv(&rising[..1]).is_none());
    }

    #[test]
    fn obv_unchanged_close_adds_nothing() {
        let candles = vec![
            candle_v(101.0, 99.0, 100.0, 5),
            candle_v(101.0, 99.0, 100.0, 7),
        ];
        assert_eq!(obv(&candles), Some(0.0));
    }

    #[test]
    fn chaikin_positive_when_closes_near_highs() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle_v(base + 1.0, base - 1.0, base + 0.9, 5)
            })
            .collect();
        let v = chaikin_oscillator(&candles).unwrap();
        assert!(v > 0.0, "accumulation should be positive, got {v}");
    }

    #[test]
    fn chaikin_insufficient_data() {
        let candles = vec![candle_v(101.0, 99.0, 100.0, 5); 9];
        assert!(chaikin_oscillator(&candles).is_none());
    }
}
