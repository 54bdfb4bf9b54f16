// =============================================================================
// Feed Wire Protocol — logical envelope over the provider channel
// =============================================================================
//
// The provider speaks JSON over one duplex WebSocket. Client requests carry a
// `req_id` the server echoes back; stream events (`tick`) arrive unsolicited
// and carry no `req_id`. Malformed frames are reported to the caller, who
// drops them with a warning — parsing never panics.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

// ── Client → server ──────────────────────────────────────────────────────────

/// One outbound request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub req_id: u64,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

/// The request bodies the engine issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum RequestPayload {
    SubscribeTicks {
        symbol: String,
    },
    UnsubscribeTicks {
        symbol: String,
    },
    CandleHistory {
        symbol: String,
        granularity: u32,
        count: usize,
    },
}

impl ClientRequest {
    /// Serialise to the JSON text frame sent on the socket.
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to serialise client request")
    }
}

// ── Server → client ──────────────────────────────────────────────────────────

/// A tick event body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickPayload {
    pub symbol: String,
    pub quote: f64,
    pub epoch: i64,
}

/// One candle of a history response. `epoch` is the bucket start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryCandle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub epoch: i64,
}

impl HistoryCandle {
    /// Convert into the engine's candle record. History candles carry no
    /// per-candle tick totals, so `tick_count` is pinned at 1.
    pub fn into_candle(self, symbol: &str, timeframe_secs: u32) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe_secs,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            start_epoch: self.epoch,
            tick_count: 1,
            is_forming: false,
        }
    }
}

/// A protocol-level error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// Every inbound frame the client understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Unsolicited per-symbol price tick.
    Tick { tick: TickPayload },
    /// Reply to a `candle_history` request.
    History {
        req_id: u64,
        candles: Vec<HistoryCandle>,
    },
    /// Positive acknowledgement of a subscribe / unsubscribe request.
    Ok { req_id: u64 },
    /// Request failure or unsolicited per-symbol fault.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req_id: Option<u64>,
        error: ErrorPayload,
    },
}

impl ServerMessage {
    /// The request id this frame answers, if it answers one.
    pub fn req_id(&self) -> Option<u64> {
        match self {
            Self::History { req_id, .. } | Self::Ok { req_id } => Some(*req_id),
            Self::Error { req_id, .. } => *req_id,
            Self::Tick { .. } => None,
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_server_message(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text).context("failed to parse server message")
}
