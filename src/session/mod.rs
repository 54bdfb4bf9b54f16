// =============================================================================
// Session Manager — per-session lifecycle and pre-close scheduling
// =============================================================================
//
// Owns every session and its timers, and wires the feed, the aggregator, and
// the signal engine together. Per forming candle each session emits at most
// one pre-close signal (deduped by the forming bucket's start epoch); firings
// for one session are strictly candle-ordered.
//
// Tick pumps are reference-counted per (symbol, timeframe) window so that two
// sessions watching the same series never double-apply a tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{is_supported_timeframe, EngineConfig};
use crate::error::EngineError;
use crate::events::{EngineEvent, EngineEventBus};
use crate::feed::{FeedEvent, MarketFeed};
use crate::market_data::{Candle, CandleAggregator, WindowKey};
use crate::signals::{SessionOptions, SignalEngine, SignalRequest, SignalResult};

/// Poll cadence while a window has no forming candle yet.
const NO_FORMING_POLL: Duration = Duration::from_millis(1000);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One user session: a (symbol, timeframe) watch with scheduled firings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Chat-equivalent subscriber id the signal is delivered to.
    pub subscriber_id: String,
    pub symbol: String,
    pub timeframe_secs: u32,
    pub status: SessionStatus,
    /// UNIX milliseconds.
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_signal_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<SessionOptions>,
}

struct SessionEntry {
    session: Session,
    /// Forming-bucket start of the last emitted signal; the dedupe guard.
    last_signal_candle_start: Option<i64>,
    scheduler: Option<JoinHandle<()>>,
}

struct PumpEntry {
    handle: JoinHandle<()>,
    refs: usize,
}

struct ManagerInner {
    feed: Arc<dyn MarketFeed>,
    aggregator: Arc<CandleAggregator>,
    signal_engine: SignalEngine,
    config: EngineConfig,
    bus: EngineEventBus,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    pumps: Mutex<HashMap<WindowKey, PumpEntry>>,
}

/// Coordinates the feed, the aggregator, and the signal engine for every
/// active session. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        aggregator: Arc<CandleAggregator>,
        config: EngineConfig,
        bus: EngineEventBus,
    ) -> Self {
        let signal_engine = SignalEngine::new(config.signal.clone(), config.volatility.clone());
        Self {
            inner: Arc::new(ManagerInner {
                feed,
                aggregator,
                signal_engine,
                config,
                bus,
                sessions: RwLock::new(HashMap::new()),
                pumps: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Spawn the feed-event listener: reconnections re-prime every active
    /// session, disconnects are forwarded to the engine bus.
    pub fn start(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut rx = manager.inner.feed.events();
            loop {
                match rx.recv().await {
                    Ok(FeedEvent::Connected) => {
                        info!("feed connected; re-priming active sessions");
                        manager.reprime_all().await;
                    }
                    Ok(FeedEvent::Disconnected) => {
                        warn!("feed disconnected");
                        manager.inner.bus.publish(EngineEvent::FeedDisconnected);
                    }
                    Ok(FeedEvent::SymbolError { symbol, message }) => {
                        warn!(symbol = %symbol, message = %message, "feed symbol error");
                    }
                    Ok(FeedEvent::Tick(_)) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session manager lagged on feed events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start a session: fetch history, seed the window, subscribe ticks, and
    /// arm the pre-close scheduler.
    pub async fn start_session(
        &self,
        id: &str,
        subscriber_id: &str,
        symbol: &str,
        timeframe_secs: u32,
        options: Option<SessionOptions>,
    ) -> Result<Session, EngineError> {
        if !is_supported_timeframe(timeframe_secs) {
            return Err(EngineError::UnsupportedTimeframe(timeframe_secs));
        }
        if self.inner.sessions.read().contains_key(id) {
            return Err(EngineError::SessionConflict(id.to_string()));
        }

        let history = self
            .inner
            .feed
            .fetch_candle_history(
                symbol,
                timeframe_secs,
                self.inner.config.signal.history_candles,
            )
            .await?;
        if history.is_empty() {
            return Err(EngineError::InsufficientHistory {
                symbol: symbol.to_string(),
                got: 0,
            });
        }

        self.inner.aggregator.initialize(
            symbol,
            timeframe_secs,
            history,
            self.inner.config.window_capacity,
        );

        self.inner.feed.subscribe_ticks(symbol, id).await?;

        let session = Session {
            id: id.to_string(),
            subscriber_id: subscriber_id.to_string(),
            symbol: symbol.to_string(),
            timeframe_secs,
            status: SessionStatus::Active,
            started_at: Utc::now().timestamp_millis(),
            last_signal_at: None,
            options,
        };

        {
            let mut sessions = self.inner.sessions.write();
            if sessions.contains_key(id) {
                // Raced with a concurrent start of the same id.
                drop(sessions);
                let _ = self.inner.feed.unsubscribe_ticks(symbol, id).await;
                return Err(EngineError::SessionConflict(id.to_string()));
            }
            sessions.insert(
                id.to_string(),
                SessionEntry {
                    session: session.clone(),
                    last_signal_candle_start: None,
                    scheduler: None,
                },
            );
        }

        self.ensure_pump(symbol, timeframe_secs);

        let scheduler = tokio::spawn(run_scheduler(self.clone(), id.to_string()));
        if let Some(entry) = self.inner.sessions.write().get_mut(id) {
            entry.scheduler = Some(scheduler);
        }

        info!(
            session_id = id,
            subscriber_id,
            symbol,
            timeframe_secs,
            "session started"
        );
        self.inner
            .bus
            .publish(EngineEvent::SessionStarted(session.clone()));
        Ok(session)
    }

    /// Stop a session: cancel its timers, release its window, unsubscribe,
    /// and emit `SessionStopped`.
    pub async fn stop_session(&self, id: &str) -> Result<Session, EngineError> {
        let mut entry = self
            .inner
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))?;

        if let Some(handle) = entry.scheduler.take() {
            handle.abort();
        }

        entry.session.status = SessionStatus::Stopped;
        let session = entry.session.clone();

        self.release_pump(&session.symbol, session.timeframe_secs);

        if let Err(e) = self
            .inner
            .feed
            .unsubscribe_ticks(&session.symbol, &session.id)
            .await
        {
            // The session is gone either way.
            warn!(session_id = id, error = %e, "unsubscribe failed during stop");
        }

        info!(session_id = id, symbol = %session.symbol, "session stopped");
        self.inner
            .bus
            .publish(EngineEvent::SessionStopped(session.clone()));
        Ok(session)
    }

    // ── Lookups ─────────────────────────────────────────────────────────

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .get(id)
            .map(|e| e.session.clone())
    }

    pub fn get_session_by_chat_id(&self, subscriber_id: &str) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .values()
            .find(|e| e.session.subscriber_id == subscriber_id)
            .map(|e| e.session.clone())
    }

    pub fn active_sessions_count(&self) -> usize {
        self.inner
            .sessions
            .read()
            .values()
            .filter(|e| e.session.status == SessionStatus::Active)
            .count()
    }

    /// Chart passthrough: the most recent closed candles of the session's
    /// window, capped at the configured chart depth.
    pub fn get_session_candles(&self, id: &str) -> Vec<Candle> {
        let Some((symbol, tf)) = self.session_window(id) else {
            return Vec::new();
        };
        let mut candles = self.inner.aggregator.get_closed_candles(&symbol, tf);
        let keep = self.inner.config.signal.chart_candles;
        if candles.len() > keep {
            candles.drain(..candles.len() - keep);
        }
        candles
    }

    /// Run the signal engine on a window right now, without any session.
    pub fn get_debug_signal(&self, symbol: &str, timeframe_secs: u32) -> SignalResult {
        let closed = self
            .inner
            .aggregator
            .get_closed_candles(symbol, timeframe_secs);
        let forming = self
            .inner
            .aggregator
            .get_forming_candle(symbol, timeframe_secs);
        let ticks = self.inner.aggregator.recent_forming_ticks(
            symbol,
            timeframe_secs,
            self.inner.config.volatility.tick_volatility_window,
        );

        let candle_close_time = forming
            .as_ref()
            .map(|f| f.close_epoch())
            .or_else(|| closed.last().map(|c| c.close_epoch() + timeframe_secs as i64))
            .unwrap_or(0);

        self.inner.signal_engine.generate(SignalRequest {
            session_id: "debug",
            symbol,
            timeframe_secs,
            closed: &closed,
            forming: forming.as_ref(),
            recent_ticks: &ticks,
            candle_close_time,
            now_ms: Utc::now().timestamp_millis(),
            options: None,
        })
    }

    // ── Pre-close emission ──────────────────────────────────────────────

    /// Emit the pre-close signal for `id` if it is due and not yet emitted
    /// for the current forming bucket. Returns the signal when one was
    /// emitted. Safe to call redundantly: the dedupe guard makes repeat
    /// calls for the same forming bucket no-ops.
    fn try_emit_pre_close(&self, id: &str, now_epoch: i64, now_ms: i64) -> Option<SignalResult> {
        let (session, last_start) = {
            let sessions = self.inner.sessions.read();
            let entry = sessions.get(id)?;
            if entry.session.status != SessionStatus::Active {
                return None;
            }
            (entry.session.clone(), entry.last_signal_candle_start)
        };

        let forming = self
            .inner
            .aggregator
            .get_forming_candle(&session.symbol, session.timeframe_secs)?;
        let close_time = forming.close_epoch();
        let deadline = close_time - self.inner.config.signal.pre_close_seconds as i64;

        if last_start == Some(forming.start_epoch) {
            debug!(
                session_id = id,
                forming_start = forming.start_epoch,
                "pre-close already emitted"
            );
            return None;
        }
        if now_epoch < deadline {
            return None;
        }

        let closed = self
            .inner
            .aggregator
            .get_closed_candles(&session.symbol, session.timeframe_secs);
        let ticks = self.inner.aggregator.recent_forming_ticks(
            &session.symbol,
            session.timeframe_secs,
            self.inner.config.volatility.tick_volatility_window,
        );

        let signal = self.inner.signal_engine.generate(SignalRequest {
            session_id: &session.id,
            symbol: &session.symbol,
            timeframe_secs: session.timeframe_secs,
            closed: &closed,
            forming: Some(&forming),
            recent_ticks: &ticks,
            candle_close_time: close_time,
            now_ms,
            options: session.options.as_ref(),
        });

        // Commit under the write lock, re-checking that the session is still
        // active and nobody emitted for this bucket in the meantime.
        let session = {
            let mut sessions = self.inner.sessions.write();
            let entry = sessions.get_mut(id)?;
            if entry.session.status != SessionStatus::Active {
                return None;
            }
            if entry.last_signal_candle_start == Some(forming.start_epoch) {
                return None;
            }
            entry.last_signal_candle_start = Some(forming.start_epoch);
            entry.session.last_signal_at = Some(now_ms);
            entry.session.clone()
        };

        info!(
            session_id = id,
            symbol = %session.symbol,
            direction = %signal.direction,
            confidence = signal.confidence,
            candle_close_time = signal.candle_close_time,
            "pre-close signal emitted"
        );
        self.inner.bus.publish(EngineEvent::PreCloseSignal {
            session,
            signal: signal.clone(),
        });
        Some(signal)
    }

    // ── Reconnect handling ──────────────────────────────────────────────

    /// Re-fetch history, re-seed windows, and re-assert subscriptions for
    /// every active session after the feed comes back.
    async fn reprime_all(&self) {
        let active: Vec<Session> = self
            .inner
            .sessions
            .read()
            .values()
            .filter(|e| e.session.status == SessionStatus::Active)
            .map(|e| e.session.clone())
            .collect();

        for session in active {
            match self
                .inner
                .feed
                .fetch_candle_history(
                    &session.symbol,
                    session.timeframe_secs,
                    self.inner.config.signal.history_candles,
                )
                .await
            {
                Ok(history) if !history.is_empty() => {
                    self.inner.aggregator.initialize(
                        &session.symbol,
                        session.timeframe_secs,
                        history,
                        self.inner.config.window_capacity,
                    );
                    if let Err(e) = self
                        .inner
                        .feed
                        .subscribe_ticks(&session.symbol, &session.id)
                        .await
                    {
                        warn!(session_id = %session.id, error = %e, "resubscribe failed");
                    }
                    info!(session_id = %session.id, symbol = %session.symbol, "session re-primed");
                }
                Ok(_) => {
                    warn!(session_id = %session.id, "empty history during re-prime");
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "history re-fetch failed");
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn session_window(&self, id: &str) -> Option<(String, u32)> {
        let sessions = self.inner.sessions.read();
        let entry = sessions.get(id)?;
        if entry.session.status != SessionStatus::Active {
            return None;
        }
        Some((entry.session.symbol.clone(), entry.session.timeframe_secs))
    }

    fn ensure_pump(&self, symbol: &str, timeframe_secs: u32) {
        let key = WindowKey::new(symbol, timeframe_secs);
        let mut pumps = self.inner.pumps.lock();
        if let Some(pump) = pumps.get_mut(&key) {
            pump.refs += 1;
            return;
        }

        let rx = self.inner.feed.events();
        let aggregator = Arc::clone(&self.inner.aggregator);
        let sym = symbol.to_string();
        let handle = tokio::spawn(run_tick_pump(rx, aggregator, sym, timeframe_secs));
        pumps.insert(key, PumpEntry { handle, refs: 1 });
    }

    fn release_pump(&self, symbol: &str, timeframe_secs: u32) {
        let key = WindowKey::new(symbol, timeframe_secs);
        let mut pumps = self.inner.pumps.lock();
        if let Some(pump) = pumps.get_mut(&key) {
            pump.refs -= 1;
            if pump.refs == 0 {
                pump.handle.abort();
                pumps.remove(&key);
                self.inner.aggregator.cleanup(symbol, timeframe_secs);
            }
        }
    }
}

/// Move feed ticks for one (symbol, timeframe) window into the aggregator.
async fn run_tick_pump(
    mut rx: broadcast::Receiver<FeedEvent>,
    aggregator: Arc<CandleAggregator>,
    symbol: String,
    timeframe_secs: u32,
) {
    loop {
        match rx.recv().await {
            Ok(FeedEvent::Tick(tick)) if tick.symbol == symbol => {
                aggregator.process_tick(&tick, timeframe_secs);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(symbol = %symbol, skipped, "tick pump lagged; ticks dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Per-session scheduler: one-shot sleeps re-armed after each firing, with a
/// 1s poll while no forming candle exists yet. Late wake-ups emit
/// immediately (the dedupe guard bounds emissions to one per bucket).
async fn run_scheduler(manager: SessionManager, id: String) {
    let pre_close = manager.inner.config.signal.pre_close_seconds as i64;

    loop {
        let Some((symbol, timeframe_secs)) = manager.session_window(&id) else {
            break;
        };
        let tf = timeframe_secs as i64;

        let sleep_for = match manager
            .inner
            .aggregator
            .get_forming_candle(&symbol, timeframe_secs)
        {
            None => NO_FORMING_POLL,
            Some(forming) => {
                let now = Utc::now().timestamp();
                let close_time = forming.close_epoch();
                let deadline = close_time - pre_close;

                if now >= deadline {
                    manager.try_emit_pre_close(&id, now, Utc::now().timestamp_millis());
                    // Next firing belongs to the following bucket.
                    let next_deadline = close_time + tf - pre_close;
                    Duration::from_secs((next_deadline - now).clamp(1, tf) as u64)
                } else {
                    Duration::from_secs((deadline - now).clamp(1, tf) as u64)
                }
            }
        };

        tokio::time::sleep(sleep_for).await;
    }
}
