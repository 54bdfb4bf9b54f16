// =============================================================================
// Psychology Engine — candle anatomy, patterns, bias, order blocks, FVG
// =============================================================================
//
// Pure function from a candle window to the behavioural read of the most
// recent bar: body/wick anatomy, detected candlestick patterns, directional
// bias, an order-block probability, and fair-value-gap detection. Multi-bar
// features look at the preceding 2-5 candles only.

pub mod patterns;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

pub use patterns::{CandlestickPattern, PatternKind};

/// Body / range ratio below which the last bar counts as a doji.
const DOJI_THRESHOLD: f64 = 0.1;

/// Bars of local context consulted for order-block and FVG features.
const CONTEXT_BARS: usize = 5;

/// Directional read of the most recent bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketBias {
    Bullish,
    Bearish,
    Neutral,
}

impl Default for MarketBias {
    fn default() -> Self {
        Self::Neutral
    }
}

/// Full psychology read of a candle window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PsychologyAnalysis {
    /// |close - open| / (high - low); 0 for a flat bar.
    pub body_ratio: f64,
    pub upper_wick_ratio: f64,
    pub lower_wick_ratio: f64,
    pub is_doji: bool,
    pub patterns: Vec<CandlestickPattern>,
    pub bias: MarketBias,
    /// Heuristic in [0, 1]: likelihood the recent impulse left a
    /// consolidation zone behind.
    pub order_block_probability: f64,
    pub fvg_detected: bool,
}

/// Analyse the working series (closed candles plus the forming candle when
/// present). An empty window produces the neutral default.
pub fn analyze(closed: &[Candle], forming: Option<&Candle>) -> PsychologyAnalysis {
    let mut series: Vec<Candle> = closed.to_vec();
    if let Some(f) = forming {
        series.push(f.clone());
    }

    let Some(last) = series.last() else {
        return PsychologyAnalysis::default();
    };

    let range = last.range();
    let (body_ratio, upper_wick_ratio, lower_wick_ratio) = if range > 0.0 {
        (
            last.body() / range,
            (last.high - last.open.max(last.close)) / range,
            (last.open.min(last.close) - last.low) / range,
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let context_start = series.len().saturating_sub(CONTEXT_BARS);
    let context = &series[context_start..];

    PsychologyAnalysis {
        body_ratio,
        upper_wick_ratio,
        lower_wick_ratio,
        is_doji: range > 0.0 && body_ratio < DOJI_THRESHOLD,
        patterns: patterns::detect_patterns(context),
        bias: bias_of(last),
        order_block_probability: order_block_probability(context),
        fvg_detected: fvg_detected(context),
    }
}

/// Bullish when the bar closes in the upper third of its range with a
/// bullish body; bearish symmetric; neutral otherwise.
fn bias_of(bar: &Candle) -> MarketBias {
    let range = bar.range();
    if range <= 0.0 {
        return MarketBias::Neutral;
    }
    let close_position = (bar.close - bar.low) / range;

    if close_position >= 2.0 / 3.0 && bar.is_bullish() {
        MarketBias::Bullish
    } else if close_position <= 1.0 / 3.0 && bar.is_bearish() {
        MarketBias::Bearish
    } else {
        MarketBias::Neutral
    }
}

/// Order-block heuristic over the local context.
///
/// Combines three normalised components: how large the prior bar's impulse
/// body is against the local mean range, how asymmetric its wicks are, and
/// how deeply the current close has retraced into the impulse body.
fn order_block_probability(context: &[Candle]) -> f64 {
    if context.len() < 2 {
        return 0.0;
    }

    let impulse = &context[context.len() - 2];
    let current = context.last().expect("context has at least two bars");

    let mean_range: f64 =
        context.iter().map(Candle::range).sum::<f64>() / context.len() as f64;
    if mean_range <= 0.0 {
        return 0.0;
    }

    let impulse_score = (impulse.body() / mean_range).min(1.0);

    let wick_asym = if impulse.range() > 0.0 {
        let upper = impulse.high - impulse.open.max(impulse.close);
        let lower = impulse.open.min(impulse.close) - impulse.low;
        ((upper - lower).abs() / impulse.range()).min(1.0)
    } else {
        0.0
    };

    let retrace = if impulse.body() > 0.0 {
        let depth = if impulse.is_bullish() {
            impulse.close - current.close
        } else {
            current.close - impulse.close
        };
        (depth / impulse.body()).clamp(0.0, 1.0)
    } else {
        0.0
    };

    (0.45 * impulse_score + 0.25 * wick_asym + 0.30 * retrace).clamp(0.0, 1.0)
}

/// Three-bar fair value gap inside the local context: bar `i` and bar `i+2`
/// leave untraded space around the middle bar.
fn fvg_detected(context: &[Candle]) -> bool {
    context.windows(3).any(|w| {
        let bullish_gap = w[0].high < w[2].low;
        let bearish_gap = w[0].low > w[2].high;
        bullish_gap || bearish_gap
    })
}
