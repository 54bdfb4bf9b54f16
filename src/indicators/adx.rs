// =============================================================================
// Average Directional Index — trend strength (Wilder)
// =============================================================================
//
//   +DM = H_t - H_{t-1}  when it exceeds both zero and the down-move
//   -DM = L_{t-1} - L_t  when it exceeds both zero and the up-move
//   +DI / -DI = 100 * Wilder(±DM) / Wilder(TR)
//   DX  = 100 * |+DI - -DI| / (+DI + -DI)
//   ADX = Wilder-smoothed DX
//
// Values: < 25 weak / absent trend, > 25 trending, > 50 strong trend.
// =============================================================================

use crate::market_data::Candle;

use super::atr::true_ranges;

/// Most recent ADX value. Needs `2 * period + 1` candles: `period` bars to
/// seed the DI averages and another `period` DX values to seed the ADX.
pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let trs = true_ranges(candles);
    let mut plus_dm = Vec::with_capacity(trs.len());
    let mut minus_dm = Vec::with_capacity(trs.len());

    for pair in candles.windows(2) {
        let up_move = pair[1].high - pair[0].high;
        let down_move = pair[0].low - pair[1].low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let period_f = period as f64;

    // Wilder-smoothed running sums, seeded with plain sums over the first
    // `period` bars.
    let mut tr_s: f64 = trs[..period].iter().sum();
    let mut plus_s: f64 = plus_dm[..period].iter().sum();
    let mut minus_s: f64 = minus_dm[..period].iter().sum();

    let mut dx_values = Vec::with_capacity(trs.len() - period + 1);
    if let Some(dx) = dx_from_sums(plus_s, minus_s, tr_s) {
        dx_values.push(dx);
    }

    for i in period..trs.len() {
        tr_s = tr_s - tr_s / period_f + trs[i];
        plus_s = plus_s - plus_s / period_f + plus_dm[i];
        minus_s = minus_s - minus_s / period_f + minus_dm[i];

        match dx_from_sums(plus_s, minus_s, tr_s) {
            Some(dx) => dx_values.push(dx),
            None => return None,
        }
    }

    if dx_values.len() < period {
        return None;
    }

    // ADX: Wilder smoothing of the DX series.
    let mut adx_val: f64 = dx_values[..period].iter().sum::<f64>() / period_f;
    for &dx in &dx_values[period..] {
        adx_val = (adx_val * (period_f - 1.0) + dx) / period_f;
    }

    adx_val.is_finite().then_some(adx_val)
}

fn dx_from_sums(plus_s: f64, minus_s: f64, tr_s: f64) -> Option<f64> {
    if !tr_s.is_finite() || tr_s <= 0.0 {
        return None;
    }
    let plus_di = 100.0 * plus_s / tr_s;
    let minus_di = 100.0 * minus_s / tr_s;
    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return Some(0.0);
    }
    let dx = 100.0 * (plus_di - minus_di).abs() / di_sum;
    dx.is_finite().then_some(dx)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "EURUSD".into(),
            timeframe_secs: 60,
            open,
            high,
            low,
            close,
            start_epoch: 0,
            tick_count: 5,
            is_forming: false,
        }
    }

    fn trending_up(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect()
    }

    fn choppy(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = if i % 2 == 0 { 100.0 } else { 101.0 };
                candle(base, base + 1.0, base - 1.0, base)
            })
            .collect()
    }

    #[test]
    fn adx_insufficient_data() {
        assert!(adx(&trending_up(28), 14).is_none());
        assert!(adx(&trending_up(29), 14).is_some());
        assert!(adx(&trending_up(50), 0).is_none());
    }

    #[test]
    fn adx_strong_in_steady_trend() {
        let v = adx(&trending_up(60), 14).unwrap();
        assert!(v > 25.0, "expected trending ADX > 25, got {v}");
    }

    #[test]
    fn adx_weak_in_chop() {
        let v = adx(&choppy(60), 14).unwrap();
        assert!(v < 25.0, "expected choppy ADX < 25, got {v}");
    }

    #[test]
    fn adx_bounded() {
        let v = adx(&trending_up(100), 14).unwrap();
        assert!((0.0..=100.0).contains(&v));
    }
}
