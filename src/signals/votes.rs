// =============================================================================
// Vote Producer Catalogue
// =============================================================================
//
// Each producer is a pure function over the indicator record, the psychology
// read, and the estimated close, emitting zero or more weighted directional
// votes. Raw weights here are pre-multiplier: the signal engine scales each
// vote by the per-producer weight table afterwards.

use serde::{Deserialize, Serialize};

use crate::indicators::{IndicatorValues, TrendDirection};
use crate::psychology::{MarketBias, PatternKind, PsychologyAnalysis};

/// Direction of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteDirection {
    Up,
    Down,
    Neutral,
}

/// A weighted directional opinion emitted by one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub indicator: String,
    pub direction: VoteDirection,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Vote {
    fn new(indicator: &str, direction: VoteDirection, weight: f64) -> Self {
        Self {
            indicator: indicator.to_string(),
            direction,
            weight,
            reason: None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Dead zone around zero for the MACD histogram vote.
const MACD_HISTOGRAM_DEAD_ZONE: f64 = 1e-5;

/// SMA deviation (fraction of price) that counts as a trend.
const SMA_TREND_BAND: f64 = 0.001;

/// Bollinger bandwidth below which the market counts as squeezed.
const SQUEEZE_BANDWIDTH: f64 = 0.02;

/// Run the whole catalogue.
pub fn collect_votes(
    values: &IndicatorValues,
    psychology: &PsychologyAnalysis,
    close: f64,
) -> Vec<Vote> {
    let mut votes = Vec::new();

    ema_cross_votes(values, close, &mut votes);
    sma_trend_votes(values, close, &mut votes);
    macd_votes(values, &mut votes);
    rsi_votes(values, &mut votes);
    stochastic_votes(values, &mut votes);
    bollinger_votes(values, close, &mut votes);
    trend_votes(values, close, &mut votes);
    oscillator_votes(values, close, &mut votes);
    psychology_votes(psychology, &mut votes);

    votes
}

// ── Moving-average producers ─────────────────────────────────────────────────

fn ema_cross_votes(values: &IndicatorValues, close: f64, votes: &mut Vec<Vote>) {
    let pairs = [
        ("ema_cross_5_21", values.ema_5, values.ema_21),
        ("ema_cross_9_21", values.ema_9, values.ema_21),
        ("ema_cross_12_50", values.ema_12, values.ema_50),
    ];

    for (name, fast, slow) in pairs {
        let (Some(fast), Some(slow)) = (fast, slow) else {
            continue;
        };
        if fast > slow && close > fast {
            votes.push(Vote::new(name, VoteDirection::Up, 1.0));
        } else if fast < slow && close < fast {
            votes.push(Vote::new(name, VoteDirection::Down, 1.0));
        } else {
            votes.push(Vote::new(name, VoteDirection::Neutral, 0.3));
        }
    }
}

fn sma_trend_votes(values: &IndicatorValues, close: f64, votes: &mut Vec<Vote>) {
    let smas = [
        ("sma_trend_20", values.sma_20),
        ("sma_trend_50", values.sma_50),
        ("sma_trend_200", values.sma_200),
    ];

    for (name, sma) in smas {
        let Some(sma) = sma else { continue };
        if sma == 0.0 {
            continue;
        }
        let deviation = (close - sma) / sma;
        if deviation > SMA_TREND_BAND {
            votes.push(
                Vote::new(name, VoteDirection::Up, 1.0)
                    .with_reason(format!("price {:.3}% above", deviation * 100.0)),
            );
        } else if deviation < -SMA_TREND_BAND {
            votes.push(
                Vote::new(name, VoteDirection::Down, 1.0)
                    .with_reason(format!("price {:.3}% below", deviation * 100.0)),
            );
        } else {
            votes.push(Vote::new(name, VoteDirection::Neutral, 0.5));
        }
    }
}

// ── Momentum producers ───────────────────────────────────────────────────────

fn macd_votes(values: &IndicatorValues, votes: &mut Vec<Vote>) {
    let Some(macd) = values.macd else { return };

    if macd.macd > macd.signal {
        votes.push(Vote::new("macd_signal", VoteDirection::Up, 1.0));
    } else if macd.macd < macd.signal {
        votes.push(Vote::new("macd_signal", VoteDirection::Down, 1.0));
    }

    if macd.histogram > MACD_HISTOGRAM_DEAD_ZONE {
        votes.push(Vote::new("macd_histogram", VoteDirection::Up, 1.0));
    } else if macd.histogram < -MACD_HISTOGRAM_DEAD_ZONE {
        votes.push(Vote::new("macd_histogram", VoteDirection::Down, 1.0));
    } else {
        votes.push(Vote::new("macd_histogram", VoteDirection::Neutral, 0.3));
    }
}

fn rsi_votes(values: &IndicatorValues, votes: &mut Vec<Vote>) {
    let Some(rsi) = values.rsi_14 else { return };

    if rsi < 30.0 {
        votes.push(
            Vote::new("rsi_oversold", VoteDirection::Up, 1.0)
                .with_reason(format!("RSI {rsi:.1}")),
        );
    } else if rsi > 70.0 {
        votes.push(
            Vote::new("rsi_overbought", VoteDirection::Down, 1.0)
                .with_reason(format!("RSI {rsi:.1}")),
        );
    } else {
        // Mid-band: a soft trend vote by the 50-cross.
        let direction = if rsi > 50.0 {
            VoteDirection::Up
        } else if rsi < 50.0 {
            VoteDirection::Down
        } else {
            VoteDirection::Neutral
        };
        votes.push(Vote::new("rsi_trend", direction, 0.5));
    }
}

fn stochastic_votes(values: &IndicatorValues, votes: &mut Vec<Vote>) {
    let Some(stoch) = values.stochastic else { return };

    // Cross: only on an actual sign change of (K - D).
    if let (Some(prev_k), Some(prev_d)) = (stoch.prev_k, stoch.prev_d) {
        if prev_k <= prev_d && stoch.k > stoch.d {
            votes.push(Vote::new("stochastic_cross", VoteDirection::Up, 1.0));
        } else if prev_k >= prev_d && stoch.k < stoch.d {
            votes.push(Vote::new("stochastic_cross", VoteDirection::Down, 1.0));
        }
    }

    if stoch.k < 20.0 {
        votes.push(Vote::new("stochastic_extreme", VoteDirection::Up, 1.0));
    } else if stoch.k > 80.0 {
        votes.push(Vote::new("stochastic_extreme", VoteDirection::Down, 1.0));
    }
}

// ── Envelope producers ───────────────────────────────────────────────────────

fn bollinger_votes(values: &IndicatorValues, close: f64, votes: &mut Vec<Vote>) {
    let Some(bands) = values.bollinger else { return };

    if let Some(bw) = bands.bandwidth() {
        if bw < SQUEEZE_BANDWIDTH {
            votes.push(
                Vote::new("bollinger_squeeze", VoteDirection::Neutral, 0.5)
                    .with_reason(format!("bandwidth {:.3}%", bw * 100.0)),
            );
        }
    }

    if close > bands.upper {
        votes.push(Vote::new("bollinger_breakout", VoteDirection::Up, 1.0));
    } else if close < bands.lower {
        votes.push(Vote::new("bollinger_breakout", VoteDirection::Down, 1.0));
    }
}

// ── Trend producers ──────────────────────────────────────────────────────────

fn trend_votes(values: &IndicatorValues, close: f64, votes: &mut Vec<Vote>) {
    if let Some(st) = values.supertrend {
        let direction = match st.direction {
            TrendDirection::Up => VoteDirection::Up,
            TrendDirection::Down => VoteDirection::Down,
        };
        votes.push(Vote::new("supertrend_signal", direction, 1.0));
    }

    if let Some(psar) = values.psar {
        if close > psar {
            votes.push(Vote::new("psar_signal", VoteDirection::Up, 1.0));
        } else if close < psar {
            votes.push(Vote::new("psar_signal", VoteDirection::Down, 1.0));
        }
    }

    if let Some(adx) = values.adx_14 {
        if adx < 25.0 {
            votes.push(
                Vote::new("adx_strength", VoteDirection::Neutral, 0.3)
                    .with_reason(format!("weak trend, ADX {adx:.1}")),
            );
        }
    }

    if let Some(hull) = values.hull_ma_9 {
        if close > hull {
            votes.push(Vote::new("hull_ma", VoteDirection::Up, 1.0));
        } else if close < hull {
            votes.push(Vote::new("hull_ma", VoteDirection::Down, 1.0));
        }
    }
}

// ── Oscillator extremes ──────────────────────────────────────────────────────

fn oscillator_votes(values: &IndicatorValues, _close: f64, votes: &mut Vec<Vote>) {
    if let Some(cci) = values.cci_20 {
        if cci < -100.0 {
            votes.push(Vote::new("cci_signal", VoteDirection::Up, 1.0));
        } else if cci > 100.0 {
            votes.push(Vote::new("cci_signal", VoteDirection::Down, 1.0));
        }
    }

    if let Some(wr) = values.williams_r {
        if wr < -80.0 {
            votes.push(Vote::new("williams_r", VoteDirection::Up, 1.0));
        } else if wr > -20.0 {
            votes.push(Vote::new("williams_r", VoteDirection::Down, 1.0));
        }
    }

    if let Some(z) = values.zscore_20 {
        if z > 2.0 {
            votes.push(
                Vote::new("mean_reversion", VoteDirection::Down, 1.0)
                    .with_reason(format!("z-score {z:.2}")),
            );
        } else if z < -2.0 {
            votes.push(
                Vote::new("mean_reversion", VoteDirection::Up, 1.0)
                    .with_reason(format!("z-score {z:.2}")),
            );
        }
    }
}

// ── Psychology producers ─────────────────────────────────────────────────────

/// Order-block probability above which a vote is emitted.
const ORDER_BLOCK_TRIGGER: f64 = 0.6;

/// Wick / range ratio above which a rejection vote is emitted.
const WICK_REJECTION_TRIGGER: f64 = 0.6;

fn psychology_votes(psychology: &PsychologyAnalysis, votes: &mut Vec<Vote>) {
    for pattern in &psychology.patterns {
        let producer = match pattern.name.as_str() {
            "bullish_engulfing" | "bearish_engulfing" => "engulfing_pattern",
            "hammer" => "hammer_pattern",
            "shooting_star" => "shooting_star",
            "doji" => "doji_pattern",
            other => other,
        };
        let direction = match pattern.kind {
            PatternKind::Bullish => VoteDirection::Up,
            PatternKind::Bearish => VoteDirection::Down,
            PatternKind::Neutral => VoteDirection::Neutral,
        };
        votes.push(
            Vote::new(producer, direction, pattern.strength)
                .with_reason(pattern.description.clone()),
        );
    }

    let bias_direction = match psychology.bias {
        MarketBias::Bullish => VoteDirection::Up,
        MarketBias::Bearish => VoteDirection::Down,
        MarketBias::Neutral => VoteDirection::Neutral,
    };

    if psychology.order_block_probability > ORDER_BLOCK_TRIGGER {
        votes.push(Vote::new(
            "order_block",
            bias_direction,
            psychology.order_block_probability,
        ));
    }

    if psychology.fvg_detected {
        votes.push(Vote::new("fvg_signal", bias_direction, 1.0));
    }

    if psychology.upper_wick_ratio > WICK_REJECTION_TRIGGER {
        votes.push(
            Vote::new("wick_rejection", VoteDirection::Down, psychology.upper_wick_ratio)
                .with_reason("upper wick rejection"),
        );
    } else if psychology.lower_wick_ratio > WICK_REJECTION_TRIGGER {
        votes.push(
            Vote::new("wick_rejection", VoteDirection::Up, psychology.lower_wick_ratio)
                .with_reason("lower wick rejection"),
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{Bands, Macd};
    use crate::psychology::CandlestickPattern;

    fn base_values() -> IndicatorValues {
        IndicatorValues::default()
    }

    fn find<'a>(votes: &'a [Vote], name: &str) -> Option<&'a Vote> {
        votes.iter().find(|v| v.indicator == name)
    }

    #[test]
    fn empty_record_produces_no_votes() {
        let votes = collect_votes(&base_values(), &PsychologyAnalysis::default(), 100.0);
        assert!(votes.is_empty());
    }

    #[test]
    fn ema_cross_up() {
        let mut values = base_values();
        values.ema_5 = Some(101.0);
        values.ema_21 = Some(100.0);
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 102.0);
        let v = find(&votes, "ema_cross_5_21").unwrap();
        assert_eq!(v.direction, VoteDirection::Up);
        assert_eq!(v.weight, 1.0);
    }

    #[test]
    fn ema_cross_neutral_when_price_below_fast() {
        let mut values = base_values();
        values.ema_5 = Some(101.0);
        values.ema_21 = Some(100.0);
        // fast > slow but price under the fast EMA.
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.5);
        let v = find(&votes, "ema_cross_5_21").unwrap();
        assert_eq!(v.direction, VoteDirection::Neutral);
        assert_eq!(v.weight, 0.3);
    }

    #[test]
    fn sma_trend_band() {
        let mut values = base_values();
        values.sma_20 = Some(100.0);

        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.2);
        assert_eq!(find(&votes, "sma_trend_20").unwrap().direction, VoteDirection::Up);

        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 99.8);
        assert_eq!(find(&votes, "sma_trend_20").unwrap().direction, VoteDirection::Down);

        // Within ±0.1% the vote is neutral at half weight.
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.05);
        let v = find(&votes, "sma_trend_20").unwrap();
        assert_eq!(v.direction, VoteDirection::Neutral);
        assert_eq!(v.weight, 0.5);
    }

    #[test]
    fn macd_histogram_dead_zone() {
        let mut values = base_values();
        values.macd = Some(Macd {
            macd: 1.0,
            signal: 1.0,
            histogram: 5e-6,
        });
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        assert_eq!(
            find(&votes, "macd_histogram").unwrap().direction,
            VoteDirection::Neutral
        );
        assert!(find(&votes, "macd_signal").is_none()); // equal lines emit nothing
    }

    #[test]
    fn rsi_extremes_and_trend() {
        let mut values = base_values();

        values.rsi_14 = Some(25.0);
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        assert_eq!(find(&votes, "rsi_oversold").unwrap().direction, VoteDirection::Up);

        values.rsi_14 = Some(75.0);
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        assert_eq!(
            find(&votes, "rsi_overbought").unwrap().direction,
            VoteDirection::Down
        );

        values.rsi_14 = Some(55.0);
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        let v = find(&votes, "rsi_trend").unwrap();
        assert_eq!(v.direction, VoteDirection::Up);
        assert_eq!(v.weight, 0.5);
    }

    #[test]
    fn stochastic_cross_requires_sign_change() {
        let mut values = base_values();
        values.stochastic = Some(crate::indicators::Stochastic {
            k: 55.0,
            d: 50.0,
            prev_k: Some(45.0),
            prev_d: Some(50.0),
        });
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        assert_eq!(
            find(&votes, "stochastic_cross").unwrap().direction,
            VoteDirection::Up
        );

        // K above D on both bars: no cross.
        values.stochastic = Some(crate::indicators::Stochastic {
            k: 55.0,
            d: 50.0,
            prev_k: Some(54.0),
            prev_d: Some(50.0),
        });
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 100.0);
        assert!(find(&votes, "stochastic_cross").is_none());
    }

    #[test]
    fn bollinger_squeeze_and_breakout() {
        let mut values = base_values();
        values.bollinger = Some(Bands {
            upper: 100.5,
            middle: 100.0,
            lower: 99.5,
        });
        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 101.0);
        assert!(find(&votes, "bollinger_squeeze").is_some()); // bandwidth 1%
        assert_eq!(
            find(&votes, "bollinger_breakout").unwrap().direction,
            VoteDirection::Up
        );

        let votes = collect_votes(&values, &PsychologyAnalysis::default(), 99.0);
        assert_eq!(
            find(&votes, "bollinger_breakout").unwrap().direction,
            VoteDirection::Down
        );
    }

    #[test]
    fn pattern_votes_carry_strength_as_weight() {
        let mut psych = PsychologyAnalysis::default();
        psych.patterns.push(CandlestickPattern {
            name: "hammer".into(),
            kind: PatternKind::Bullish,
            strength: 0.8,
            description: "test".into(),
        });
        let votes = collect_votes(&base_values(), &psych, 100.0);
        let v = find(&votes, "hammer_pattern").unwrap();
        assert_eq!(v.direction, VoteDirection::Up);
        assert_eq!(v.weight, 0.8);
    }

    #[test]
    fn order_block_and_fvg_follow_bias() {
        let mut psych = PsychologyAnalysis::default();
        psych.bias = MarketBias::Bullish;
        psych.order_block_probability = 0.75;
        psych.fvg_detected = true;

        let votes = collect_votes(&base_values(), &psych, 100.0);
        let ob = find(&votes, "order_block").unwrap();
        assert_eq!(ob.direction, VoteDirection::Up);
        assert_eq!(ob.weight, 0.75);
        assert_eq!(find(&votes, "fvg_signal").unwrap().direction, VoteDirection::Up);
    }

    #[test]
    fn order_block_below_trigger_is_silent() {
        let mut psych = PsychologyAnalysis::default();
        psych.order_block_probability = 0.5;
        let votes = collect_votes(&base_values(), &psych, 100.0);
        assert!(find(&votes, "order_block").is_none());
    }

    #[test]
    fn wick_rejection_votes() {
        let mut psych = PsychologyAnalysis::default();
        psych.upper_wick_ratio = 0.7;
        let votes = collect_votes(&base_values(), &psych, 100.0);
        let v = find(&votes, "wick_rejection").unwrap();
        assert_eq!(v.direction, VoteDirection::Down);
        assert!((v.weight - 0.7).abs() < 1e-12);

        let mut psych = PsychologyAnalysis::default();
        psych.lower_wick_ratio = 0.65;
        let votes = collect_votes(&base_values(), &psych, 100.0);
        assert_eq!(find(&votes, "wick_rejection").unwrap().direction, VoteDirection::Up);
    }
}
