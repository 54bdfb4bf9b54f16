// =============================================================================
// Moving Averages — EMA, SMA, WMA, Hull MA, EMA ribbon
// =============================================================================
//
// EMA:  multiplier = 2 / (period + 1)
//       EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//       seeded with the SMA of the first `period` closes.
//
// Hull: HMA(n) = WMA(2 * WMA(n/2) - WMA(n), sqrt(n)) — a moving average that
//       keeps responsiveness while suppressing lag.
//
// Every function returns `None` (or an empty series) on insufficient data.
// =============================================================================

/// Compute the EMA series for `closes` with look-back `period`. The first
/// element corresponds to the close at index `period - 1`.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(closes.len() - period + 1);
    series.push(seed);

    let mut prev = seed;
    for &close in &closes[period..] {
        let ema = close * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            // A broken series must not leak partial garbage downstream.
            break;
        }
        series.push(ema);
        prev = ema;
    }

    series
}

/// Most recent EMA value, `None` when fewer than `period` closes exist.
pub fn latest_ema(closes: &[f64], period: usize) -> Option<f64> {
    ema_series(closes, period).last().copied()
}

/// Simple moving average of the last `period` closes.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let sum: f64 = closes[closes.len() - period..].iter().sum();
    let avg = sum / period as f64;
    avg.is_finite().then_some(avg)
}

/// Linearly weighted moving average of the last `period` closes (most recent
/// close carries the highest weight).
pub fn wma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let tail = &closes[closes.len() - period..];
    let mut weighted = 0.0;
    for (i, &close) in tail.iter().enumerate() {
        weighted += close * (i + 1) as f64;
    }
    let denom = (period * (period + 1)) as f64 / 2.0;
    let avg = weighted / denom;
    avg.is_finite().then_some(avg)
}

/// Hull Moving Average over `period` closes.
///
/// Needs `period + round(sqrt(period)) - 1` closes: the final smoothing WMA
/// consumes `sqrt(period)` raw values, each of which needs a full `period`
/// look-back.
pub fn hull_ma(closes: &[f64], period: usize) -> Option<f64> {
    if period < 2 {
        return None;
    }
    let half = period / 2;
    let sqrt_p = (period as f64).sqrt().round() as usize;
    if sqrt_p == 0 || closes.len() < period + sqrt_p - 1 {
        return None;
    }

    let mut raw = Vec::with_capacity(sqrt_p);
    for end in (closes.len() - sqrt_p + 1)..=closes.len() {
        let slice = &closes[..end];
        let w_half = wma(slice, half)?;
        let w_full = wma(slice, period)?;
        raw.push(2.0 * w_half - w_full);
    }

    wma(&raw, sqrt_p)
}

/// Periods of the EMA ribbon, shortest to longest.
const RIBBON_PERIODS: [usize; 5] = [5, 9, 12, 21, 50];

/// Signed alignment of the EMA ribbon, in [-1, 1].
///
/// Each adjacent (shorter, longer) pair contributes +1 when the shorter EMA
/// sits above the longer, -1 when below; the sum is divided by the pair
/// count. +1.0 is a fully bullish stack, -1.0 fully bearish.
pub fn ema_ribbon(closes: &[f64]) -> Option<f64> {
    let longest = *RIBBON_PERIODS.last().expect("ribbon has periods");
    if closes.len() < longest {
        return None;
    }

    let mut emas = Vec::with_capacity(RIBBON_PERIODS.len());
    for period in RIBBON_PERIODS {
        emas.push(latest_ema(closes, period)?);
    }

    let mut score = 0.0;
    for pair in emas.windows(2) {
        if pair[0] > pair[1] {
            score += 1.0;
        } else if pair[0] < pair[1] {
            score -= 1.0;
        }
    }
    Some(score / (RIBBON_PERIODS.len() - 1) as f64)
}
