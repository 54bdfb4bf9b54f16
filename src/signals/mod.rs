// =============================================================================
// Signal Engine — weighted directional voting over indicators + psychology
// =============================================================================
//
// Pipeline per firing:
//   1. Gate on window depth (under `min_candles_for_signal` => NO_TRADE)
//   2. Run the prediction engine; a volatility override => NO_TRADE
//   3. Collect votes from the producer catalogue
//   4. Filter by enabled set, scale by custom / default weights
//   5. Score:  pUp = sumUp / (sumUp + sumDown + 1e-9)
//              confidence = round(max(pUp, 1 - pUp) * 100)
//   6. Decide: confidence under the floor => NO_TRADE, else CALL when
//      pUp > 0.5, otherwise PUT.
//
// Signal generation never fails: degenerate inputs produce a well-formed
// NO_TRADE result.

pub mod votes;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{default_indicator_weights, default_weight_for, SignalConfig, VolatilityConfig};
use crate::indicators::IndicatorValues;
use crate::market_data::Candle;
use crate::prediction;
use crate::psychology::PsychologyAnalysis;

pub use votes::{collect_votes, Vote, VoteDirection};

/// Guard against division by zero in the probability normalisation.
const SCORE_EPSILON: f64 = 1e-9;

/// The three signal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    #[serde(rename = "CALL")]
    Call,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "NO_TRADE")]
    NoTrade,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
            Self::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}

/// Per-session overrides for signal generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Whitelist of producer names; absent means every producer is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_indicators: Option<Vec<String>>,
    /// Per-producer weight multipliers replacing the built-in table entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_weights: Option<HashMap<String, f64>>,
    /// Override for the ATR volatility threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volatility_threshold: Option<f64>,
}

/// The full signal record pushed to subscribers and the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub session_id: String,
    pub symbol: String,
    pub timeframe_secs: u32,
    /// Wall-clock emission time, UNIX milliseconds.
    pub timestamp: i64,
    /// Epoch (seconds) at which the evaluated candle closes.
    pub candle_close_time: i64,
    pub direction: SignalDirection,
    /// 0-100.
    pub confidence: u32,
    pub p_up: f64,
    pub p_down: f64,
    pub votes: Vec<Vote>,
    pub indicators: IndicatorValues,
    pub psychology: PsychologyAnalysis,
    pub volatility_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_reason: Option<String>,
    pub closed_candles_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forming_candle: Option<Candle>,
}

/// Borrowed inputs for one signal generation.
pub struct SignalRequest<'a> {
    pub session_id: &'a str,
    pub symbol: &'a str,
    pub timeframe_secs: u32,
    pub closed: &'a [Candle],
    pub forming: Option<&'a Candle>,
    /// Recent tick prices of the forming candle, oldest first.
    pub recent_ticks: &'a [f64],
    /// Epoch (seconds) at which the evaluated candle closes.
    pub candle_close_time: i64,
    /// Wall-clock time of the firing, UNIX milliseconds. Passed in so that
    /// generation stays a pure function of its inputs.
    pub now_ms: i64,
    pub options: Option<&'a SessionOptions>,
}

/// Stateless signal generator configured once at startup.
pub struct SignalEngine {
    signal_cfg: SignalConfig,
    volatility_cfg: VolatilityConfig,
    default_weights: HashMap<String, f64>,
}

impl SignalEngine {
    pub fn new(signal_cfg: SignalConfig, volatility_cfg: VolatilityConfig) -> Self {
        Self {
            signal_cfg,
            volatility_cfg,
            default_weights: default_indicator_weights(),
        }
    }

    /// Generate a signal for one candle window.
    pub fn generate(&self, req: SignalRequest<'_>) -> SignalResult {
        // ── 1. Window-depth gate ─────────────────────────────────────────
        if req.closed.len() < self.volatility_cfg.min_candles_for_signal {
            debug!(
                symbol = req.symbol,
                candles = req.closed.len(),
                needed = self.volatility_cfg.min_candles_for_signal,
                "insufficient window for signal"
            );
            return self.no_trade(&req, IndicatorValues::default(), PsychologyAnalysis::default(), false, None);
        }

        // ── 2. Prediction + volatility override ──────────────────────────
        let mut vol_cfg = self.volatility_cfg.clone();
        if let Some(threshold) = req.options.and_then(|o| o.volatility_threshold) {
            vol_cfg.atr_threshold = threshold;
        }

        let prediction = prediction::predict(req.closed, req.forming, req.recent_ticks, &vol_cfg);

        if prediction.volatility.is_volatile {
            debug!(
                symbol = req.symbol,
                reason = ?prediction.volatility.reason,
                "volatility override"
            );
            return self.no_trade(
                &req,
                prediction.indicators,
                prediction.psychology,
                true,
                prediction.volatility.reason,
            );
        }

        // ── 3. Collect, filter, and weight votes ─────────────────────────
        let mut votes = collect_votes(
            &prediction.indicators,
            &prediction.psychology,
            prediction.estimated_close,
        );

        if let Some(enabled) = req.options.and_then(|o| o.enabled_indicators.as_ref()) {
            votes.retain(|v| enabled.iter().any(|name| name == &v.indicator));
        }

        let custom = req.options.and_then(|o| o.custom_weights.as_ref());
        let mut final_up = 0.0;
        let mut final_down = 0.0;
        for vote in &mut votes {
            let multiplier = custom
                .and_then(|m| m.get(&vote.indicator).copied())
                .unwrap_or_else(|| default_weight_for(&self.default_weights, &vote.indicator));
            vote.weight *= multiplier;

            match vote.direction {
                VoteDirection::Up => final_up += vote.weight,
                VoteDirection::Down => final_down += vote.weight,
                VoteDirection::Neutral => {}
            }
        }

        // ── 4. Score ─────────────────────────────────────────────────────
        if final_up + final_down == 0.0 {
            // Every producer abstained; nothing to normalise against.
            let mut result = self.no_trade(
                &req,
                prediction.indicators,
                prediction.psychology,
                false,
                None,
            );
            result.votes = votes;
            return result;
        }

        let p_up = final_up / (final_up + final_down + SCORE_EPSILON);
        let p_down = 1.0 - p_up;
        let confidence = (p_up.max(p_down) * 100.0).round() as u32;

        let direction = if confidence < self.signal_cfg.min_confidence {
            SignalDirection::NoTrade
        } else if p_up > 0.5 {
            SignalDirection::Call
        } else {
            SignalDirection::Put
        };

        SignalResult {
            session_id: req.session_id.to_string(),
            symbol: req.symbol.to_string(),
            timeframe_secs: req.timeframe_secs,
            timestamp: req.now_ms,
            candle_close_time: req.candle_close_time,
            direction,
            confidence,
            p_up,
            p_down,
            votes,
            indicators: prediction.indicators,
            psychology: prediction.psychology,
            volatility_override: false,
            volatility_reason: None,
            closed_candles_count: req.closed.len(),
            forming_candle: req.forming.cloned(),
        }
    }

    fn no_trade(
        &self,
        req: &SignalRequest<'_>,
        indicators: IndicatorValues,
        psychology: PsychologyAnalysis,
        volatility_override: bool,
        volatility_reason: Option<String>,
    ) -> SignalResult {
        SignalResult {
            session_id: req.session_id.to_string(),
            symbol: req.symbol.to_string(),
            timeframe_secs: req.timeframe_secs,
            timestamp: req.now_ms,
            candle_close_time: req.candle_close_time,
            direction: SignalDirection::NoTrade,
            confidence: 0,
            p_up: 0.0,
            p_down: 1.0,
            votes: Vec::new(),
            indicators,
            psychology,
            volatility_override,
            volatility_reason,
            closed_candles_count: req.closed.len(),
            forming_candle: req.forming.cloned(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SignalEngine {
        SignalEngine::new(SignalConfig::default(), VolatilityConfig::default())
    }

    /// A gentle uptrend with tight ranges: +0.2 per bar on a ~100 base, bar
    /// range 0.35, so ATR/price stays well under the volatility threshold.
    fn uptrend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.2;
                Candle {
                    symbol: "EURUSD".into(),
                    timeframe_secs: 60,
                    open: close - 0.2,
                    high: close + 0.1,
                    low: close - 0.25,
                    close,
                    start_epoch: i as i64 * 60,
                    tick_count: 6,
                    is_forming: false,
                }
            })
            .collect()
    }

    /// Wide-range bars: ATR/price around 1%, twice the override threshold.
    fn violent(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i % 2) as f64;
                Candle {
                    symbol: "EURUSD".into(),
                    timeframe_secs: 60,
                    open: base,
                    high: base + 0.5,
                    low: base - 0.5,
                    close: base + 0.2,
                    start_epoch: i as i64 * 60,
                    tick_count: 6,
                    is_forming: false,
                }
            })
            .collect()
    }

    fn request<'a>(closed: &'a [Candle], options: Option<&'a SessionOptions>) -> SignalRequest<'a> {
        SignalRequest {
            session_id: "sess-1",
            symbol: "EURUSD",
            timeframe_secs: 60,
            closed,
            forming: None,
            recent_ticks: &[],
            candle_close_time: closed.last().map(|c| c.close_epoch()).unwrap_or(0),
            now_ms: 1_700_000_000_000,
            options,
        }
    }

    #[test]
    fn insufficient_data_is_clean_no_trade() {
        let closed = uptrend(10);
        let result = engine().generate(request(&closed, None));

        assert_eq!(result.direction, SignalDirection::NoTrade);
        assert_eq!(result.confidence, 0);
        assert!(result.votes.is_empty());
        assert!(result.indicators.is_empty());
        assert!(!result.volatility_override);
        assert_eq!(result.closed_candles_count, 10);
    }

    #[test]
    fn volatility_override_forces_no_trade() {
        let closed = violent(100);
        let result = engine().generate(request(&closed, None));

        assert_eq!(result.direction, SignalDirection::NoTrade);
        assert_eq!(result.confidence, 0);
        assert!(result.volatility_override);
        assert!(result.volatility_reason.is_some());
        // Indicators are still populated for diagnostics.
        assert!(result.indicators.atr_14.is_some());
    }

    #[test]
    fn call_path_in_clean_uptrend() {
        let closed = uptrend(100);
        let result = engine().generate(request(&closed, None));

        assert_eq!(result.direction, SignalDirection::Call, "votes: {:?}", result.votes);
        assert!(result.confidence >= 60, "confidence {}", result.confidence);
        assert!(result.p_up > 0.5);

        let up_names: Vec<&str> = result
            .votes
            .iter()
            .filter(|v| v.direction == VoteDirection::Up)
            .map(|v| v.indicator.as_str())
            .collect();
        assert!(up_names.contains(&"ema_cross_5_21"), "{up_names:?}");
        assert!(up_names.contains(&"macd_signal"), "{up_names:?}");
        assert!(
            up_names.iter().any(|n| n.starts_with("sma_trend")),
            "{up_names:?}"
        );
        assert!(up_names.len() >= 3);
    }

    #[test]
    fn put_path_in_clean_downtrend() {
        let mut closed = uptrend(100);
        // Mirror the series around 110 to invert the trend.
        for c in &mut closed {
            let m = 220.0;
            let (open, high, low, close) = (m - c.open, m - c.low, m - c.high, m - c.close);
            c.open = open;
            c.high = high;
            c.low = low;
            c.close = close;
        }
        let result = engine().generate(request(&closed, None));
        assert_eq!(result.direction, SignalDirection::Put, "votes: {:?}", result.votes);
        assert!(result.confidence >= 60);
    }

    #[test]
    fn probability_closure_invariant() {
        let closed = uptrend(100);
        let result = engine().generate(request(&closed, None));
        assert!((result.p_up + result.p_down - 1.0).abs() < 1e-9);
        let expected = (result.p_up.max(result.p_down) * 100.0).round() as u32;
        assert_eq!(result.confidence, expected);
    }

    #[test]
    fn generation_is_idempotent() {
        let closed = uptrend(100);
        let a = engine().generate(request(&closed, None));
        let b = engine().generate(request(&closed, None));
        assert_eq!(a, b);
    }

    #[test]
    fn confidence_gate_invariant() {
        // Raise the floor above anything the window can produce.
        let cfg = SignalConfig {
            min_confidence: 101,
            ..SignalConfig::default()
        };
        let engine = SignalEngine::new(cfg, VolatilityConfig::default());
        let closed = uptrend(100);
        let result = engine.generate(request(&closed, None));
        assert_eq!(result.direction, SignalDirection::NoTrade);
    }

    #[test]
    fn enabled_indicators_whitelist_filters_votes() {
        let closed = uptrend(100);
        let options = SessionOptions {
            enabled_indicators: Some(vec!["ema_cross_5_21".into()]),
            ..SessionOptions::default()
        };
        let result = engine().generate(request(&closed, Some(&options)));
        assert!(!result.votes.is_empty());
        assert!(result.votes.iter().all(|v| v.indicator == "ema_cross_5_21"));
    }

    #[test]
    fn custom_weights_scale_votes() {
        let closed = uptrend(100);

        let mut weights = HashMap::new();
        weights.insert("ema_cross_5_21".to_string(), 0.1);
        let options = SessionOptions {
            custom_weights: Some(weights),
            ..SessionOptions::default()
        };

        let default_run = engine().generate(request(&closed, None));
        let custom_run = engine().generate(request(&closed, Some(&options)));

        let default_w = default_run
            .votes
            .iter()
            .find(|v| v.indicator == "ema_cross_5_21")
            .unwrap()
            .weight;
        let custom_w = custom_run
            .votes
            .iter()
            .find(|v| v.indicator == "ema_cross_5_21")
            .unwrap()
            .weight;
        assert!((default_w - 1.2).abs() < 1e-9); // table weight
        assert!((custom_w - 0.1).abs() < 1e-9); // override
    }

    #[test]
    fn options_volatility_threshold_override() {
        let closed = uptrend(100);
        // Tighten the ATR threshold until even the calm uptrend trips it.
        let options = SessionOptions {
            volatility_threshold: Some(1e-6),
            ..SessionOptions::default()
        };
        let result = engine().generate(request(&closed, Some(&options)));
        assert!(result.volatility_override);
        assert_eq!(result.direction, SignalDirection::NoTrade);
        assert_eq!(result.confidence, 0);
    }

    #[test]
    fn whitelist_with_no_directional_votes_abstains() {
        let closed = uptrend(100);
        let options = SessionOptions {
            enabled_indicators: Some(vec!["no_such_producer".into()]),
            ..SessionOptions::default()
        };
        let result = engine().generate(request(&closed, Some(&options)));
        assert_eq!(result.direction, SignalDirection::NoTrade);
        assert_eq!(result.confidence, 0);
        assert!(result.votes.is_empty());
    }

    #[test]
    fn serialised_directions_use_wire_names() {
        assert_eq!(
            serde_json::to_string(&SignalDirection::Call).unwrap(),
            "\"CALL\""
        );
        assert_eq!(
            serde_json::to_string(&SignalDirection::NoTrade).unwrap(),
            "\"NO_TRADE\""
        );
    }
}
