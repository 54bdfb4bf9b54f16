// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Recoverable faults (feed retries, malformed ticks) are handled at the
// source and never surface here. These variants cover the non-recoverable
// outcomes reported to the caller of the triggering operation.

use thiserror::Error;

/// Errors surfaced by the session manager and feed client.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The feed connection is down and could not be restored within the
    /// request timeout, or a request failed at the protocol level.
    #[error("feed unavailable: {0}")]
    FeedUnavailable(String),

    /// `start_session` was called with an id that already exists.
    #[error("session {0} already exists")]
    SessionConflict(String),

    /// No session with the given id.
    #[error("no session with id {0}")]
    SessionNotFound(String),

    /// The requested timeframe is not in the supported set.
    #[error("unsupported timeframe: {0}s")]
    UnsupportedTimeframe(u32),

    /// The feed returned fewer history candles than the engine can seed a
    /// session with.
    #[error("insufficient history for {symbol}: got {got} candles")]
    InsufficientHistory { symbol: String, got: usize },
}
