// =============================================================================
// Parabolic SAR (step 0.02, max 0.2)
// =============================================================================
//
// The SAR accelerates towards price while the trend persists:
//   SAR_t = SAR_{t-1} + AF * (EP - SAR_{t-1})
// where EP is the extreme point of the current trend and AF grows by `step`
// on every new extreme up to `max`. Penetration of the SAR flips the trend
// and resets AF.
// =============================================================================

use crate::market_data::Candle;

/// Most recent Parabolic SAR value with standard (0.02, 0.2) parameters.
pub fn psar(candles: &[Candle]) -> Option<f64> {
    psar_with(candles, 0.02, 0.2)
}

/// Parabolic SAR with explicit acceleration step and cap.
pub fn psar_with(candles: &[Candle], step: f64, max_af: f64) -> Option<f64> {
    if candles.len() < 2 || step <= 0.0 || max_af < step {
        return None;
    }

    let mut rising = candles[1].close >= candles[0].close;
    let mut sar = if rising {
        candles[0].low
    } else {
        candles[0].high
    };
    let mut extreme = if rising {
        candles[1].high
    } else {
        candles[1].low
    };
    let mut af = step;

    for i in 1..candles.len() {
        sar += af * (extreme - sar);

        // SAR may never enter the prior two bars' range.
        if rising {
            sar = sar.min(candles[i - 1].low);
            if i >= 2 {
                sar = sar.min(candles[i - 2].low);
            }
        } else {
            sar = sar.max(candles[i - 1].high);
            if i >= 2 {
                sar = sar.max(candles[i - 2].high);
            }
        }

        let bar = &candles[i];
        if rising {
            if bar.low < sar {
                // Flip to falling.
                rising = false;
                sar = extreme;
                extreme = bar.low;
                af = step;
            } else if bar.high > extreme {
                extreme = bar.high;
                af = (af + step).min(max_af);
            }
        } else if bar.high > sar {
            rising = true;
            sar = extreme;
            extreme = bar.high;
            af = step;
        } else if bar.low < extreme {
            extreme = bar.low;
            af = (af + step).min(max_af);
        }

        if !sar.is_finite() {
            return None;
        }
    }

    Some(sar)
}
