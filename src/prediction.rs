// =============================================================================
// Prediction Engine — forming-candle close estimate + volatility gate
// =============================================================================
//
// Combines the closed window and the live forming candle into the inputs the
// signal engine consumes: the estimated close, the full indicator record, the
// psychology read, and a short-horizon volatility assessment.
//
// The volatility gate fires on either rule:
//   - ATR14 / estimated close above `atr_threshold`
//   - (max - min) / mid of the recent forming-candle ticks above
//     `tick_volatility_threshold`

use serde::{Deserialize, Serialize};

use crate::config::VolatilityConfig;
use crate::indicators::{self, IndicatorValues};
use crate::market_data::Candle;
use crate::psychology::{self, PsychologyAnalysis};

/// Short-horizon volatility verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityAssessment {
    pub is_volatile: bool,
    /// Names the rule that fired, for the signal's diagnostic trail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Combined inputs for the signal engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// The forming candle's current close, falling back to the last closed
    /// candle's close when no ticks have arrived yet.
    pub estimated_close: f64,
    pub indicators: IndicatorValues,
    pub psychology: PsychologyAnalysis,
    pub volatility: VolatilityAssessment,
}

/// Run the indicator and psychology engines over the working series and
/// assess volatility. `recent_ticks` are the forming candle's latest tick
/// prices, oldest first.
pub fn predict(
    closed: &[Candle],
    forming: Option<&Candle>,
    recent_ticks: &[f64],
    cfg: &VolatilityConfig,
) -> Prediction {
    let estimated_close = forming
        .map(|c| c.close)
        .or_else(|| closed.last().map(|c| c.close))
        .unwrap_or(0.0);

    let indicators = indicators::compute(closed, forming);
    let psychology = psychology::analyze(closed, forming);
    let volatility = assess_volatility(&indicators, estimated_close, recent_ticks, cfg);

    Prediction {
        estimated_close,
        indicators,
        psychology,
        volatility,
    }
}

fn assess_volatility(
    indicators: &IndicatorValues,
    estimated_close: f64,
    recent_ticks: &[f64],
    cfg: &VolatilityConfig,
) -> VolatilityAssessment {
    if let Some(atr) = indicators.atr_14 {
        if estimated_close > 0.0 {
            let ratio = atr / estimated_close;
            if ratio > cfg.atr_threshold {
                return VolatilityAssessment {
                    is_volatile: true,
                    reason: Some(format!(
                        "ATR ratio {:.5} exceeds threshold {:.5}",
                        ratio, cfg.atr_threshold
                    )),
                };
            }
        }
    }

    let window_start = recent_ticks.len().saturating_sub(cfg.tick_volatility_window);
    let window = &recent_ticks[window_start..];
    if window.len() >= 2 {
        let max = window.iter().fold(f64::MIN, |a, &b| a.max(b));
        let min = window.iter().fold(f64::MAX, |a, &b| a.min(b));
        let mid = (max + min) / 2.0;
        if mid > 0.0 {
            let ratio = (max - min) / mid;
            if ratio > cfg.tick_volatility_threshold {
                return VolatilityAssessment {
                    is_volatile: true,
                    reason: Some(format!(
                        "tick range {:.5} over last {} ticks exceeds threshold {:.5}",
                        ratio,
                        window.len(),
                        cfg.tick_volatility_threshold
                    )),
                };
            }
        }
    }

    VolatilityAssessment::default()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(start_epoch: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            symbol: "EURUSD".into(),
            timeframe_secs: 60,
            open,
            high,
            low,
            close,
            start_epoch,
            tick_count: 4,
            is_forming: false,
        }
    }

    fn calm(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i % 3) as f64 * 0.01;
                candle(i as i64 * 60, base, base + 0.02, base - 0.02, base + 0.01)
            })
            .collect()
    }

    fn violent(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i % 2) as f64 * 3.0;
                candle(i as i64 * 60, base, base + 2.0, base - 2.0, base - 1.0)
            })
            .collect()
    }

    #[test]
    fn estimated_close_prefers_forming() {
        let closed = calm(30);
        let mut forming = candle(30 * 60, 100.0, 100.6, 99.9, 100.5);
        forming.is_forming = true;

        let p = predict(&closed, Some(&forming), &[], &VolatilityConfig::default());
        assert_eq!(p.estimated_close, 100.5);

        let p = predict(&closed, None, &[], &VolatilityConfig::default());
        assert_eq!(p.estimated_close, closed.last().unwrap().close);
    }

    #[test]
    fn empty_window_degenerates_cleanly() {
        let p = predict(&[], None, &[], &VolatilityConfig::default());
        assert_eq!(p.estimated_close, 0.0);
        assert!(p.indicators.is_empty());
        assert!(!p.volatility.is_volatile);
    }

    #[test]
    fn calm_market_passes_gate() {
        let p = predict(&calm(100), None, &[], &VolatilityConfig::default());
        assert!(!p.volatility.is_volatile);
        assert!(p.volatility.reason.is_none());
    }

    #[test]
    fn atr_rule_fires_on_wide_ranges() {
        let p = predict(&violent(100), None, &[], &VolatilityConfig::default());
        assert!(p.volatility.is_volatile);
        let reason = p.volatility.reason.unwrap();
        assert!(reason.contains("ATR"), "unexpected reason: {reason}");
        // The indicator record is still fully populated on the override path.
        assert!(p.indicators.atr_14.is_some());
    }

    #[test]
    fn tick_rule_fires_on_jumpy_ticks() {
        // Calm candles, but the forming candle's ticks jump around.
        let ticks = vec![100.0, 100.9, 100.1, 100.8, 100.2];
        let p = predict(&calm(100), None, &ticks, &VolatilityConfig::default());
        assert!(p.volatility.is_volatile);
        let reason = p.volatility.reason.unwrap();
        assert!(reason.contains("tick range"), "unexpected reason: {reason}");
    }

    #[test]
    fn tick_rule_respects_window() {
        // Old spike outside the 10-tick window must not fire the gate.
        let mut ticks = vec![100.0, 105.0];
        ticks.extend(std::iter::repeat(100.0).take(10));
        let p = predict(&calm(100), None, &ticks, &VolatilityConfig::default());
        assert!(!p.volatility.is_volatile);
    }

    #[test]
    fn custom_threshold_is_respected() {
        let mut cfg = VolatilityConfig::default();
        cfg.atr_threshold = 10.0; // effectively disabled
        cfg.tick_volatility_threshold = 10.0;
        let p = predict(&violent(100), None, &[100.0, 140.0], &cfg);
        assert!(!p.volatility.is_volatile);
    }
}
