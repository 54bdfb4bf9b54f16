// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of every indicator the signal
// pipeline consumes. Each function returns `Option<T>` (or an empty series)
// so callers are forced to handle insufficient-data and numerical-edge-case
// scenarios; a field that cannot be computed is simply absent — never NaN,
// never a zero placeholder.

pub mod adx;
pub mod atr;
pub mod bands;
pub mod cci;
pub mod ema;
pub mod macd;
pub mod oscillators;
pub mod psar;
pub mod rsi;
pub mod stats;
pub mod stochastic;
pub mod supertrend;
pub mod volume;

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

pub use atr::AtrBands;
pub use bands::{Bands, DonchianChannel};
pub use macd::Macd;
pub use stochastic::Stochastic;
pub use supertrend::{SuperTrend, TrendDirection};

/// The full indicator record computed over one candle window.
///
/// Every field is optional: absence means the window was too short for that
/// indicator's look-back. Serialisation omits absent fields entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValues {
    // ── Moving averages ─────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_9: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_12: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_21: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_20: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma_200: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hull_ma_9: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_ribbon: Option<f64>,

    // ── Momentum ────────────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macd: Option<Macd>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_14: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stochastic: Option<Stochastic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub williams_r: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cci_20: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roc_12: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub momentum_10: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ultimate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fisher: Option<f64>,

    // ── Volatility & envelopes ──────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr_14: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr_bands: Option<AtrBands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger: Option<Bands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keltner: Option<Bands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donchian: Option<DonchianChannel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_percentile: Option<f64>,

    // ── Trend ───────────────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adx_14: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supertrend: Option<SuperTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psar: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linreg_slope_14: Option<f64>,

    // ── Volume proxies ──────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaikin: Option<f64>,

    // ── Mean reversion ──────────────────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zscore_20: Option<f64>,
}

impl IndicatorValues {
    /// True when no field could be computed (degenerate window).
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Compute the full indicator record from closed candles plus the current
/// forming candle, when present. The forming candle's live OHLC participates
/// as the final bar of the working series.
pub fn compute(closed: &[Candle], forming: Option<&Candle>) -> IndicatorValues {
    let mut series: Vec<Candle> = closed.to_vec();
    if let Some(f) = forming {
        series.push(f.clone());
    }
    compute_over(&series)
}

fn compute_over(candles: &[Candle]) -> IndicatorValues {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    IndicatorValues {
        ema_5: ema::latest_ema(&closes, 5),
        ema_9: ema::latest_ema(&closes, 9),
        ema_12: ema::latest_ema(&closes, 12),
        ema_21: ema::latest_ema(&closes, 21),
        ema_50: ema::latest_ema(&closes, 50),
        sma_20: ema::sma(&closes, 20),
        sma_50: ema::sma(&closes, 50),
        sma_200: ema::sma(&closes, 200),
        hull_ma_9: ema::hull_ma(&closes, 9),
        ema_ribbon: ema::ema_ribbon(&closes),

        macd: macd::macd(&closes),
        rsi_14: rsi::latest_rsi(&closes, 14),
        stochastic: stochastic::stochastic(candles),
        williams_r: stochastic::williams_r(candles, 14),
        cci_20: cci::cci(candles, 20),
        roc_12: oscillators::roc(&closes, 12),
        momentum_10: oscillators::momentum(&closes, 10),
        ultimate: oscillators::ultimate_oscillator(candles),
        fisher: oscillators::fisher_transform(candles, 10),

        atr_14: atr::atr(candles, 14),
        atr_bands: atr::atr_bands(candles, 14, 2.0),
        bollinger: bands::bollinger(&closes, 20, 2.0),
        keltner: bands::keltner(candles, 20, 2.0),
        donchian: bands::donchian(candles, 20),
        range_percentile: stats::range_percentile(candles, 20),

        adx_14: adx::adx(candles, 14),
        supertrend: supertrend::supertrend(candles),
        psar: psar::psar(candles),
        linreg_slope_14: stats::linreg_slope(&closes, 14),

        vwap: volume::vwap(candles),
        obv: volume::obv(candles),
        chaikin: volume::chaikin_oscillator(candles),

        zscore_20: stats::zscore(&closes, 20),
    }
}
