// =============================================================================
// SuperTrend (10, 3) — ATR trailing band with direction state
// =============================================================================
//
//   basic upper = (H + L) / 2 + mult * ATR
//   basic lower = (H + L) / 2 - mult * ATR
//
// Final bands only ratchet towards price; direction flips when the close
// crosses the opposite final band. While the trend is up the indicator rides
// the lower band, while down the upper band.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

use super::atr::true_ranges;

/// Trend side of the SuperTrend band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

/// SuperTrend line value plus the side price is trending on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperTrend {
    pub value: f64,
    pub direction: TrendDirection,
}

/// Most recent SuperTrend with standard (10, 3.0) parameters.
pub fn supertrend(candles: &[Candle]) -> Option<SuperTrend> {
    supertrend_with(candles, 10, 3.0)
}

/// SuperTrend with explicit ATR period and band multiplier.
pub fn supertrend_with(candles: &[Candle], period: usize, mult: f64) -> Option<SuperTrend> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    // Running Wilder ATR aligned so that `atr_at[i]` belongs to candle
    // `i + period` of the input.
    let trs = true_ranges(candles);
    let period_f = period as f64;
    let mut atr_val = trs[..period].iter().sum::<f64>() / period_f;
    if !atr_val.is_finite() {
        return None;
    }

    let hl2 = |c: &Candle| (c.high + c.low) / 2.0;

    let first = &candles[period];
    let mut final_upper = hl2(first) + mult * atr_val;
    let mut final_lower = hl2(first) - mult * atr_val;
    let mut direction = if first.close <= final_upper {
        TrendDirection::Down
    } else {
        TrendDirection::Up
    };

    for i in (period + 1)..candles.len() {
        atr_val = (atr_val * (period_f - 1.0) + trs[i - 1]) / period_f;
        if !atr_val.is_finite() {
            return None;
        }

        let bar = &candles[i];
        let prev_close = candles[i - 1].close;
        let basic_upper = hl2(bar) + mult * atr_val;
        let basic_lower = hl2(bar) - mult * atr_val;

        // Bands never loosen while price stays inside them.
        if basic_upper < final_upper || prev_close > final_upper {
            final_upper = basic_upper;
        }
        if basic_lower > final_lower || prev_close < final_lower {
            final_lower = basic_lower;
        }

        direction = match direction {
            TrendDirection::Up if bar.close < final_lower => TrendDirection::Down,
            TrendDirection::Down if bar.close > final_upper => TrendDirection::Up,
            other => other,
        };
    }

    let value = match direction {
        TrendDirection::Up => final_lower,
        TrendDirection::Down => final_upper,
    };
    value.is_finite().then_some(SuperTrend { value, direction })
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

    fn trending(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                candle(base + 1.0, base - 1.0, base + 0.5 * step.signum())
            })
            .collect()
    }

    #[test]
    fn supertrend_insufficient_data() {
        assert!(supertrend(&trending(10, 1.0)).is_none());
        assert!(supertrend(&trending(11, 1.0)).is_some());
    }

    #[test]
    fn uptrend_rides_lower_band() {
        let candles = trending(60, 1.0);
        let st = supertrend(&candles).unwrap();
        assert_eq!(st.direction, TrendDirection::Up);
        assert!(st.value < candles.last().unwrap().close);
    }

    #[test]
    fn downtrend_rides_upper_band() {
        let candles = trending(60, -1.0);
        let st = supertrend(&candles).unwrap();
        assert_eq!(st.direction, TrendDirection::Down);
        assert!(st.value > candles.last().unwrap().close);
    }

    #[test]
    fn reversal_flips_direction() {
        let mut candles = trending(40, 1.0);
        // Sharp collapse well below the trailing band.
        let last = candles.last().unwrap().close;
        for i in 0..15 {
            let base = last - 3.0 * (i + 1) as f64;
            candles.push(candle(base + 1.0, base - 1.0, base - 0.5));
        }
        let st = supertrend(&candles).unwrap();
        assert_eq!(st.direction, TrendDirection::Down);
    }
}
