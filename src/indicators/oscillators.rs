// =============================================================================
// Momentum Oscillators — ROC, Momentum, Ultimate Oscillator, Fisher Transform
// =============================================================================
//
// ROC(n)      = 100 * (C - C_{-n}) / C_{-n}
// Momentum(n) = C - C_{-n}
// Ultimate    = 100 * (4*BP7/TR7 + 2*BP14/TR14 + BP28/TR28) / 7
//   with BP = C - min(L, prevC), TR = max(H, prevC) - min(L, prevC)
// Fisher(n)   = 0.5 * ln((1 + x) / (1 - x)) of the normalised mid-price
//   position in the n-bar range, doubly smoothed.
// =============================================================================

use crate::market_data::Candle;

/// Rate of change over `period` closes, in percent.
pub fn roc(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let current = *closes.last()?;
    let past = closes[closes.len() - 1 - period];
    if past == 0.0 {
        return None;
    }
    let value = 100.0 * (current - past) / past;
    value.is_finite().then_some(value)
}

/// Absolute momentum over `period` closes.
pub fn momentum(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let value = *closes.last()? - closes[closes.len() - 1 - period];
    value.is_finite().then_some(value)
}

/// Ultimate Oscillator with standard (7, 14, 28) windows, in [0, 100].
pub fn ultimate_oscillator(candles: &[Candle]) -> Option<f64> {
    ultimate_with(candles, 7, 14, 28)
}

/// Ultimate Oscillator with explicit short / mid / long windows.
pub fn ultimate_with(candles: &[Candle], short: usize, mid: usize, long: usize) -> Option<f64> {
    if short == 0 || short >= mid || mid >= long {
        return None;
    }
    if candles.len() < long + 1 {
        return None;
    }

    // Buying pressure and true range per bar (needs the previous close).
    let mut bp = Vec::with_capacity(candles.len() - 1);
    let mut tr = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let prev_close = pair[0].close;
        let bar = &pair[1];
        let low = bar.low.min(prev_close);
        let high = bar.high.max(prev_close);
        bp.push(bar.close - low);
        tr.push(high - low);
    }

    let avg = |n: usize| -> Option<f64> {
        let bp_sum: f64 = bp[bp.len() - n..].iter().sum();
        let tr_sum: f64 = tr[tr.len() - n..].iter().sum();
        if tr_sum <= 0.0 || !tr_sum.is_finite() {
            return None;
        }
        Some(bp_sum / tr_sum)
    };

    let a_short = avg(short)?;
    let a_mid = avg(mid)?;
    let a_long = avg(long)?;

    let value = 100.0 * (4.0 * a_short + 2.0 * a_mid + a_long) / 7.0;
    value.is_finite().then_some(value)
}

/// Fisher Transform over `period` bars of the mid-price.
pub fn fisher_transform(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let mids: Vec<f64> = candles.iter().map(|c| (c.high + c.low) / 2.0).collect();

    let mut value = 0.0_f64;
    let mut fish = 0.0_f64;

    for end in period..=mids.len() {
        let window = &mids[end - period..end];
        let highest = window.iter().fold(f64::MIN, |a, &b| a.max(b));
        let lowest = window.iter().fold(f64::MAX, |a, &b| a.min(b));
        let range = highest - lowest;

        let position = if range > 0.0 {
            2.0 * ((mids[end - 1] - lowest) / range - 0.5)
        } else {
            0.0
        };

        // Smooth and clamp away from the asymptotes of ln.
        value = (0.66 * position + 0.34 * value).clamp(-0.999, 0.999);
        fish = 0.5 * ((1.0 + value) / (1.0 - value)).ln() + 0.5 * fish;

        if !fish.is_finite() {
            return None;
        }
    }

    Some(fish)
}
