// =============================================================================
// Engine Configuration — signal timing, volatility gates, indicator weights
// =============================================================================
//
// Every tunable of the signal pipeline lives here. Values are immutable after
// process start; the file is loaded once and env overrides are applied by the
// composition root.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry serde defaults so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Candle timeframes (seconds) the engine accepts at session start.
pub const SUPPORTED_TIMEFRAMES: &[u32] = &[60, 120, 300, 900, 1800, 3600];

/// True when `timeframe_secs` is one of the supported granularities.
pub fn is_supported_timeframe(timeframe_secs: u32) -> bool {
    SUPPORTED_TIMEFRAMES.contains(&timeframe_secs)
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_min_confidence() -> u32 {
    60
}

fn default_pre_close_seconds() -> u32 {
    4
}

fn default_send_signal_seconds() -> u32 {
    3
}

fn default_history_candles() -> usize {
    300
}

fn default_chart_candles() -> usize {
    100
}

fn default_atr_threshold() -> f64 {
    0.005
}

fn default_tick_volatility_threshold() -> f64 {
    0.003
}

fn default_tick_volatility_window() -> usize {
    10
}

fn default_min_candles_for_signal() -> usize {
    50
}

fn default_window_capacity() -> usize {
    500
}

fn default_feed_url() -> String {
    "wss://feed.borealis.internal/v1/stream".to_string()
}

// =============================================================================
// SignalConfig
// =============================================================================

/// Timing and confidence parameters for signal emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Minimum confidence (0-100) required to emit a directional decision.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u32,

    /// Seconds before candle close at which the signal is computed.
    #[serde(default = "default_pre_close_seconds")]
    pub pre_close_seconds: u32,

    /// Seconds before candle close by which the signal should have reached
    /// subscribers; downstream consumers use this as their delivery bound.
    #[serde(default = "default_send_signal_seconds")]
    pub send_signal_seconds: u32,

    /// Closed candles fetched from the feed when a session starts.
    #[serde(default = "default_history_candles")]
    pub history_candles: usize,

    /// Candles exposed to chart consumers via `get_session_candles`.
    #[serde(default = "default_chart_candles")]
    pub chart_candles: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            pre_close_seconds: default_pre_close_seconds(),
            send_signal_seconds: default_send_signal_seconds(),
            history_candles: default_history_candles(),
            chart_candles: default_chart_candles(),
        }
    }
}

// =============================================================================
// VolatilityConfig
// =============================================================================

/// Thresholds for the volatility abstention gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// Maximum ATR14 / price ratio before the engine abstains.
    #[serde(default = "default_atr_threshold")]
    pub atr_threshold: f64,

    /// Maximum (max - min) / mid ratio over the recent tick window.
    #[serde(default = "default_tick_volatility_threshold")]
    pub tick_volatility_threshold: f64,

    /// Number of recent forming-candle ticks inspected for tick-scale
    /// volatility.
    #[serde(default = "default_tick_volatility_window")]
    pub tick_volatility_window: usize,

    /// Minimum closed candles required before any directional signal.
    #[serde(default = "default_min_candles_for_signal")]
    pub min_candles_for_signal: usize,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            atr_threshold: default_atr_threshold(),
            tick_volatility_threshold: default_tick_volatility_threshold(),
            tick_volatility_window: default_tick_volatility_window(),
            min_candles_for_signal: default_min_candles_for_signal(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Market-data feed WebSocket endpoint.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Closed-candle window capacity per (symbol, timeframe).
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    #[serde(default)]
    pub signal: SignalConfig,

    #[serde(default)]
    pub volatility: VolatilityConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            window_capacity: default_window_capacity(),
            signal: SignalConfig::default(),
            volatility: VolatilityConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// Returns an error when the file is missing or malformed so the caller
    /// can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            feed_url = %config.feed_url,
            min_confidence = config.signal.min_confidence,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Default indicator weight table
// =============================================================================

/// Built-in weight multipliers per vote producer. Producers missing from the
/// table default to 1.0. All values sit in the 0.7 - 1.5 band.
pub fn default_indicator_weights() -> HashMap<String, f64> {
    let mut w = HashMap::new();
    w.insert("ema_cross_5_21".to_string(), 1.2);
    w.insert("ema_cross_9_21".to_string(), 1.1);
    w.insert("ema_cross_12_50".to_string(), 1.3);
    w.insert("sma_trend_20".to_string(), 0.8);
    w.insert("sma_trend_50".to_string(), 0.9);
    w.insert("sma_trend_200".to_string(), 1.0);
    w.insert("macd_signal".to_string(), 1.4);
    w.insert("macd_histogram".to_string(), 1.2);
    w.insert("rsi_oversold".to_string(), 1.3);
    w.insert("rsi_overbought".to_string(), 1.3);
    w.insert("stochastic_cross".to_string(), 1.1);
    w.insert("bollinger_breakout".to_string(), 1.4);
    w.insert("supertrend_signal".to_string(), 1.5);
    w.insert("psar_signal".to_string(), 1.2);
    w.insert("engulfing_pattern".to_string(), 1.5);
    w.insert("hammer_pattern".to_string(), 1.3);
    w.insert("shooting_star".to_string(), 1.3);
    w.insert("doji_pattern".to_string(), 0.8);
    w.insert("order_block".to_string(), 1.4);
    w.insert("fvg_signal".to_string(), 1.2);
    w.insert("wick_rejection".to_string(), 1.1);
    w
}

/// Multiplier for `name` from the built-in table, 1.0 when unlisted.
pub fn default_weight_for(table: &HashMap<String, f64>, name: &str) -> f64 {
    table.get(name).copied().unwrap_or(1.0)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.signal.min_confidence, 60);
        assert_eq!(cfg.signal.pre_close_seconds, 4);
        assert_eq!(cfg.signal.send_signal_seconds, 3);
        assert_eq!(cfg.signal.history_candles, 300);
        assert_eq!(cfg.signal.chart_candles, 100);
        assert!((cfg.volatility.atr_threshold - 0.005).abs() < f64::EPSILON);
        assert!((cfg.volatility.tick_volatility_threshold - 0.003).abs() < f64::EPSILON);
        assert_eq!(cfg.volatility.tick_volatility_window, 10);
        assert_eq!(cfg.volatility.min_candles_for_signal, 50);
        assert_eq!(cfg.window_capacity, 500);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.signal.min_confidence, 60);
        assert_eq!(cfg.volatility.min_candles_for_signal, 50);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "signal": { "min_confidence": 70 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.signal.min_confidence, 70);
        assert_eq!(cfg.signal.pre_close_seconds, 4);
        assert_eq!(cfg.window_capacity, 500);
    }

    #[test]
    fn supported_timeframes() {
        for tf in [60, 120, 300, 900, 1800, 3600] {
            assert!(is_supported_timeframe(tf));
        }
        assert!(!is_supported_timeframe(30));
        assert!(!is_supported_timeframe(600));
        assert!(!is_supported_timeframe(0));
    }

    #[test]
    fn weight_table_values_in_band() {
        let table = default_indicator_weights();
        for (name, w) in &table {
            assert!(
                (0.7..=1.5).contains(w),
                "weight for {name} out of band: {w}"
            );
        }
        assert!((default_weight_for(&table, "supertrend_signal") - 1.5).abs() < f64::EPSILON);
        assert!((default_weight_for(&table, "unknown_producer") - 1.0).abs() < f64::EPSILON);
    }
}
