// =============================================================================
// Candlestick pattern recognition
// =============================================================================
//
// Detects the reversal shapes the vote catalogue consumes: engulfing pairs,
// hammer, shooting star, and doji. Each detection carries a strength in
// (0, 1] derived from how cleanly the bar matches the canonical geometry.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

// ── Thresholds ───────────────────────────────────────────────────────────────

/// Body / range ratio below which a candle is a doji.
const DOJI_BODY_RATIO: f64 = 0.1;

/// Body / range ratio at or below which a candle body counts as "small" for
/// hammer / shooting-star shapes.
const SMALL_BODY_RATIO: f64 = 0.3;

/// Minimum long-wick / body multiple for hammer and shooting-star shapes.
const LONG_WICK_MULTIPLE: f64 = 2.0;

/// Maximum opposing-wick / body multiple (the "tiny" wick side).
const SHORT_WICK_MULTIPLE: f64 = 0.5;

/// Wick / range ratio at which a rejection wick reaches full strength.
const FULL_STRENGTH_WICK: f64 = 0.6;

/// Guard against division by zero on flat candles.
const MIN_BODY: f64 = 1e-9;

// ── Types ────────────────────────────────────────────────────────────────────

/// Directional bias of a candlestick pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Bullish,
    Bearish,
    Neutral,
}

/// A detected candlestick pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlestickPattern {
    pub name: String,
    pub kind: PatternKind,
    /// How cleanly the bar matches the canonical geometry, in (0, 1].
    pub strength: f64,
    pub description: String,
}

impl CandlestickPattern {
    fn new(
        name: impl Into<String>,
        kind: PatternKind,
        strength: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            strength: strength.clamp(f64::MIN_POSITIVE, 1.0),
            description: description.into(),
        }
    }
}

// ── Detection ────────────────────────────────────────────────────────────────

/// Detect patterns on the final bar of `candles` (with one bar of look-back
/// for the two-bar shapes). Empty when nothing matches.
pub fn detect_patterns(candles: &[Candle]) -> Vec<CandlestickPattern> {
    let Some(last) = candles.last() else {
        return Vec::new();
    };

    let mut found = Vec::new();

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if let Some(p) = engulfing(prev, last) {
            found.push(p);
        }
    }

    if let Some(p) = hammer(last) {
        found.push(p);
    }
    if let Some(p) = shooting_star(last) {
        found.push(p);
    }
    if let Some(p) = doji(last) {
        found.push(p);
    }

    found
}

/// Current body fully engulfs the previous opposite-colour body.
fn engulfing(prev: &Candle, cur: &Candle) -> Option<CandlestickPattern> {
    let prev_body = prev.body();
    if prev_body < MIN_BODY || cur.body() < MIN_BODY {
        return None;
    }

    let engulfs = cur.open.min(cur.close) <= prev.open.min(prev.close)
        && cur.open.max(cur.close) >= prev.open.max(prev.close);
    if !engulfs {
        return None;
    }

    // Strength grows from 0.6 towards 1.0 as the engulfing body doubles the
    // engulfed one.
    let strength = (0.6 + 0.4 * (cur.body() / prev_body - 1.0)).clamp(0.6, 1.0);

    if cur.is_bullish() && prev.is_bearish() {
        Some(CandlestickPattern::new(
            "bullish_engulfing",
            PatternKind::Bullish,
            strength,
            "bullish body engulfs prior bearish body",
        ))
    } else if cur.is_bearish() && prev.is_bullish() {
        Some(CandlestickPattern::new(
            "bearish_engulfing",
            PatternKind::Bearish,
            strength,
            "bearish body engulfs prior bullish body",
        ))
    } else {
        None
    }
}

/// Small body near the top with a long lower rejection wick.
fn hammer(bar: &Candle) -> Option<CandlestickPattern> {
    let range = bar.range();
    if range <= 0.0 {
        return None;
    }
    let body = bar.body().max(MIN_BODY);
    let upper = bar.high - bar.open.max(bar.close);
    let lower = bar.open.min(bar.close) - bar.low;

    let small_body = bar.body() / range <= SMALL_BODY_RATIO;
    if small_body && lower >= LONG_WICK_MULTIPLE * body && upper <= SHORT_WICK_MULTIPLE * body {
        let strength = ((lower / range) / FULL_STRENGTH_WICK).clamp(0.1, 1.0);
        return Some(CandlestickPattern::new(
            "hammer",
            PatternKind::Bullish,
            strength,
            "long lower wick rejecting the lows",
        ));
    }
    None
}

/// Mirror of the hammer: small body near the bottom, long upper wick.
fn shooting_star(bar: &Candle) -> Option<CandlestickPattern> {
    let range = bar.range();
    if range <= 0.0 {
        return None;
    }
    let body = bar.body().max(MIN_BODY);
    let upper = bar.high - bar.open.max(bar.close);
    let lower = bar.open.min(bar.close) - bar.low;

    let small_body = bar.body() / range <= SMALL_BODY_RATIO;
    if small_body && upper >= LONG_WICK_MULTIPLE * body && lower <= SHORT_WICK_MULTIPLE * body {
        let strength = ((upper / range) / FULL_STRENGTH_WICK).clamp(0.1, 1.0);
        return Some(CandlestickPattern::new(
            "shooting_star",
            PatternKind::Bearish,
            strength,
            "long upper wick rejecting the highs",
        ));
    }
    None
}

/// Body under 10% of the bar range.
fn doji(bar: &Candle) -> Option<CandlestickPattern> {
    let range = bar.range();
    if range <= 0.0 {
        return None;
    }
    let ratio = bar.body() / range;
    if ratio >= DOJI_BODY_RATIO {
        return None;
    }
    // Thinner body, stronger indecision.
    let strength = (1.0 - ratio / DOJI_BODY_RATIO).max(0.1);
    Some(CandlestickPattern::new(
        "doji",
        PatternKind::Neutral,
        strength,
        "open and close nearly equal",
    ))
}

// =============================================================================
// Tests
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
            tick_count: 3,
            is_forming: false,
        }
    }

    #[test]
    fn no_patterns_on_empty_input() {
        assert!(detect_patterns(&[]).is_empty());
    }

    #[test]
    fn bullish_engulfing_detected() {
        let prev = candle(102.0, 102.5, 99.5, 100.0); // bearish
        let cur = candle(99.5, 103.5, 99.0, 103.0); // bullish, engulfs
        let found = detect_patterns(&[prev, cur]);
        let p = found
            .iter()
            .find(|p| p.name == "bullish_engulfing")
            .expect("engulfing not detected");
        assert_eq!(p.kind, PatternKind::Bullish);
        assert!(p.strength >= 0.6 && p.strength <= 1.0);
    }

    #[test]
    fn bearish_engulfing_detected() {
        let prev = candle(100.0, 102.5, 99.5, 102.0); // bullish
        let cur = candle(102.5, 103.0, 99.0, 99.5); // bearish, engulfs
        let found = detect_patterns(&[prev, cur]);
        assert!(found.iter().any(|p| p.name == "bearish_engulfing"));
    }

    #[test]
    fn same_colour_bars_do_not_engulf() {
        let prev = candle(100.0, 102.5, 99.5, 102.0); // bullish
        let cur = candle(99.0, 104.0, 98.5, 103.5); // bullish, larger
        let found = detect_patterns(&[prev, cur]);
        assert!(!found.iter().any(|p| p.name.contains("engulfing")));
    }

    #[test]
    fn hammer_detected() {
        // Long lower wick, small body near the top.
        let bar = candle(100.0, 100.25, 96.0, 100.2);
        let found = detect_patterns(&[bar]);
        let p = found.iter().find(|p| p.name == "hammer").expect("no hammer");
        assert_eq!(p.kind, PatternKind::Bullish);
        assert!(p.strength > 0.9, "deep wick should score high: {}", p.strength);
    }

    #[test]
    fn shooting_star_detected() {
        let bar = candle(100.2, 104.4, 99.9, 100.0);
        let found = detect_patterns(&[bar]);
        let p = found
            .iter()
            .find(|p| p.name == "shooting_star")
            .expect("no shooting star");
        assert_eq!(p.kind, PatternKind::Bearish);
    }

    #[test]
    fn doji_detected_and_graded() {
        let thin = candle(100.0, 101.0, 99.0, 100.01);
        let found = detect_patterns(&[thin]);
        let p = found.iter().find(|p| p.name == "doji").expect("no doji");
        assert_eq!(p.kind, PatternKind::Neutral);
        assert!(p.strength > 0.9);

        // Body at exactly 10% of range is not a doji.
        let chunky = candle(100.0, 101.0, 99.0, 100.2);
        assert!(!detect_patterns(&[chunky])
            .iter()
            .any(|p| p.name == "doji"));
    }

    #[test]
    fn flat_bar_yields_nothing() {
        let flat = candle(100.0, 100.0, 100.0, 100.0);
        assert!(detect_patterns(&[flat]).is_empty());
    }
}
