// =============================================================================
// WsFeedClient — persistent duplex connection to the market-data provider
// =============================================================================
//
// One connection task owns the socket. Request/reply frames are correlated
// through a `req_id -> oneshot` map with a bounded timeout; tick events fan
// out on a broadcast channel in arrival order (per-symbol FIFO).
//
// Reconnection: exponential backoff from 1s, capped at 30s, with jitter. On
// every reconnect the entire subscription table is re-issued BEFORE the
// `Connected` event is signalled, so consumers never observe a connected feed
// with missing subscriptions. Pending requests are failed on disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::market_data::{Candle, Tick};

use super::protocol::{
    parse_server_message, ClientRequest, RequestPayload, ServerMessage,
};
use super::{FeedEvent, MarketFeed, SubscriptionTable};

/// Bound on one request/reply round trip (also the history-fetch timeout).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff start and cap.
const BACKOFF_START_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 30;

/// Buffered feed events per subscriber; laggards drop old ticks.
const EVENT_CAPACITY: usize = 1024;

struct FeedShared {
    url: String,
    connected: AtomicBool,
    subscriptions: Mutex<SubscriptionTable>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>,
    next_req_id: AtomicU64,
    outbound_tx: mpsc::UnboundedSender<String>,
    events_tx: broadcast::Sender<FeedEvent>,
}

/// Handle to the process-wide feed connection. Cheap to clone.
#[derive(Clone)]
pub struct WsFeedClient {
    inner: Arc<FeedShared>,
    outbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
}

impl WsFeedClient {
    pub fn new(url: impl Into<String>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(FeedShared {
                url: url.into(),
                connected: AtomicBool::new(false),
                subscriptions: Mutex::new(SubscriptionTable::new()),
                pending: Mutex::new(HashMap::new()),
                next_req_id: AtomicU64::new(0),
                outbound_tx,
                events_tx,
            }),
            outbound_rx: Arc::new(Mutex::new(Some(outbound_rx))),
        }
    }

    /// Spawn the connection task. Call once from the composition root; the
    /// task reconnects forever until the process exits.
    pub fn start(&self) {
        let shared = self.inner.clone();
        let rx = self
            .outbound_rx
            .lock()
            .take()
            .expect("feed connection loop already started");

        tokio::spawn(async move {
            run_connection_loop(shared, rx).await;
        });
    }

    /// Issue one request and await its correlated reply.
    async fn request(&self, payload: RequestPayload) -> Result<ServerMessage, EngineError> {
        let req_id = self.inner.next_req_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = ClientRequest { req_id, payload }
            .to_frame()
            .map_err(|e| EngineError::FeedUnavailable(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(req_id, tx);

        if self.inner.outbound_tx.send(frame).is_err() {
            self.inner.pending.lock().remove(&req_id);
            return Err(EngineError::FeedUnavailable(
                "feed connection task is not running".into(),
            ));
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(ServerMessage::Error { error, .. })) => Err(EngineError::FeedUnavailable(
                format!("{}: {}", error.code, error.message),
            )),
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(EngineError::FeedUnavailable("connection lost".into())),
            Err(_) => {
                self.inner.pending.lock().remove(&req_id);
                Err(EngineError::FeedUnavailable("request timed out".into()))
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketFeed for WsFeedClient {
    async fn fetch_candle_history(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError> {
        let reply = self
            .request(RequestPayload::CandleHistory {
                symbol: symbol.to_string(),
                granularity: timeframe_secs,
                count,
            })
            .await?;

        match reply {
            ServerMessage::History { candles, .. } => {
                let mut out: Vec<Candle> = candles
                    .into_iter()
                    .map(|c| c.into_candle(symbol, timeframe_secs))
                    .collect();
                out.sort_by_key(|c| c.start_epoch);
                Ok(out)
            }
            other => Err(EngineError::FeedUnavailable(format!(
                "unexpected reply to history request: {other:?}"
            ))),
        }
    }

    async fn subscribe_ticks(&self, symbol: &str, subscriber_id: &str) -> Result<(), EngineError> {
        let first = self.inner.subscriptions.lock().add(symbol, subscriber_id);
        if !first {
            debug!(symbol, subscriber_id, "tick subscription ref-count bumped");
            return Ok(());
        }

        match self
            .request(RequestPayload::SubscribeTicks {
                symbol: symbol.to_string(),
            })
            .await
        {
            Ok(_) => {
                info!(symbol, "tick stream subscribed");
                Ok(())
            }
            Err(e) => {
                // Roll the table back so a retry issues the subscribe again.
                self.inner.subscriptions.lock().remove(symbol, subscriber_id);
                Err(e)
            }
        }
    }

    async fn unsubscribe_ticks(
        &self,
        symbol: &str,
        subscriber_id: &str,
    ) -> Result<(), EngineError> {
        let last = self.inner.subscriptions.lock().remove(symbol, subscriber_id);
        if !last {
            return Ok(());
        }

        // Best effort: the session is going away regardless of whether the
        // forget frame makes it out.
        let req_id = self.inner.next_req_id.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = ClientRequest {
            req_id,
            payload: RequestPayload::UnsubscribeTicks {
                symbol: symbol.to_string(),
            },
        }
        .to_frame()
        .map_err(|e| EngineError::FeedUnavailable(e.to_string()))?;

        if self.inner.outbound_tx.send(frame).is_err() {
            debug!(symbol, "unsubscribe dropped: connection task not running");
        } else {
            info!(symbol, "tick stream unsubscribed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    fn events(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.events_tx.subscribe()
    }
}

// ── Connection loop ──────────────────────────────────────────────────────────

async fn run_connection_loop(
    shared: Arc<FeedShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        info!(url = %shared.url, attempt, "connecting to market-data feed");

        match connect_async(&shared.url).await {
            Ok((ws_stream, _response)) => {
                attempt = 0;
                let (mut write, mut read) = ws_stream.split();

                // Re-issue every active subscription before announcing the
                // connection, so no consumer sees a gap.
                let symbols = shared.subscriptions.lock().symbols();
                let mut resubscribe_failed = false;
                for symbol in symbols {
                    let req_id = shared.next_req_id.fetch_add(1, Ordering::Relaxed) + 1;
                    let frame = ClientRequest {
                        req_id,
                        payload: RequestPayload::SubscribeTicks { symbol: symbol.clone() },
                    }
                    .to_frame();
                    match frame {
                        Ok(text) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                resubscribe_failed = true;
                                break;
                            }
                            debug!(symbol = %symbol, "subscription re-issued after reconnect");
                        }
                        Err(e) => warn!(error = %e, "failed to build resubscribe frame"),
                    }
                }

                if !resubscribe_failed {
                    shared.connected.store(true, Ordering::Release);
                    let _ = shared.events_tx.send(FeedEvent::Connected);
                    info!("market-data feed connected");

                    loop {
                        tokio::select! {
                            frame = outbound_rx.recv() => match frame {
                                Some(text) => {
                                    if write.send(Message::Text(text)).await.is_err() {
                                        error!("feed write failed");
                                        break;
                                    }
                                }
                                // Every client handle dropped; shut down.
                                None => return,
                            },
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => handle_frame(&shared, &text),
                                // tungstenite answers pings itself; other
                                // frame types carry nothing for us.
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    error!(error = %e, "feed read error");
                                    break;
                                }
                                None => {
                                    warn!("feed stream ended");
                                    break;
                                }
                            },
                        }
                    }
                }

                shared.connected.store(false, Ordering::Release);
                fail_pending(&shared);
                drain_stale_outbound(&mut outbound_rx);
                let _ = shared.events_tx.send(FeedEvent::Disconnected);
            }
            Err(e) => {
                warn!(error = %e, "feed connect attempt failed");
            }
        }

        attempt += 1;
        let delay = backoff_delay(attempt);
        warn!(attempt, delay_ms = delay.as_millis() as u64, "feed reconnecting after backoff");
        tokio::time::sleep(delay).await;
    }
}

/// Route one inbound frame: ticks and symbol faults fan out as events,
/// everything with a `req_id` resolves its pending request.
fn handle_frame(shared: &FeedShared, text: &str) {
    let msg = match parse_server_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "malformed feed frame dropped");
            return;
        }
    };

    match msg {
        ServerMessage::Tick { tick } => {
            let _ = shared.events_tx.send(FeedEvent::Tick(Tick::new(
                tick.symbol,
                tick.quote,
                tick.epoch,
            )));
        }
        ServerMessage::Error { req_id: None, error } => {
            if let Some(symbol) = error.symbol {
                let _ = shared.events_tx.send(FeedEvent::SymbolError {
                    symbol,
                    message: error.message,
                });
            } else {
                warn!(code = %error.code, message = %error.message, "unsolicited feed error");
            }
        }
        other => {
            if let Some(req_id) = other.req_id() {
                if let Some(tx) = shared.pending.lock().remove(&req_id) {
                    let _ = tx.send(other);
                } else {
                    debug!(req_id, "reply for unknown request dropped");
                }
            }
        }
    }
}

/// Fail every in-flight request; their awaiters map the dropped sender to
/// `FeedUnavailable`.
fn fail_pending(shared: &FeedShared) {
    let mut pending = shared.pending.lock();
    let count = pending.len();
    pending.clear();
    if count > 0 {
        warn!(count, "in-flight feed requests failed by disconnect");
    }
}

/// Requests queued while the socket was down are stale; their awaiters have
/// already timed out or will shortly.
fn drain_stale_outbound(rx: &mut mpsc::UnboundedReceiver<String>) {
    while rx.try_recv().is_ok() {}
}

/// Exponential backoff with jitter: 1s, 2s, 4s, ... capped at 30s, plus up
/// to 400ms of jitter to avoid thundering reconnects.
fn backoff_delay(attempt: u32) -> Duration {
    let base = backoff_base_secs(attempt);
    let jitter_ms = rand::rng().random_range(0..400);
    Duration::from_secs(base) + Duration::from_millis(jitter_ms)
}

fn backoff_base_secs(attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(10);
    (BACKOFF_START_SECS << exp).min(BACKOFF_CAP_SECS)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_base_secs(1), 1);
        assert_eq!(backoff_base_secs(2), 2);
        assert_eq!(backoff_base_secs(3), 4);
        assert_eq!(backoff_base_secs(5), 16);
        assert_eq!(backoff_base_secs(6), 30);
        assert_eq!(backoff_base_secs(50), 30);
    }

    #[test]
    fn backoff_delay_within_bounds() {
        for attempt in 1..8 {
            let d = backoff_delay(attempt);
            let base = Duration::from_secs(backoff_base_secs(attempt));
            assert!(d >= base);
            assert!(d < base + Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn tick_frames_fan_out_as_events() {
        let client = WsFeedClient::new("wss://unused.invalid");
        let mut rx = client.events();

        handle_frame(
            &client.inner,
            r#"{"msg_type":"tick","tick":{"symbol":"EURUSD","quote":1.1,"epoch":1700000000}}"#,
        );

        match rx.recv().await.unwrap() {
            FeedEvent::Tick(tick) => {
                assert_eq!(tick.symbol, "EURUSD");
                assert_eq!(tick.epoch, 1_700_000_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn replies_resolve_pending_requests() {
        let client = WsFeedClient::new("wss://unused.invalid");
        let (tx, rx) = oneshot::channel();
        client.inner.pending.lock().insert(42, tx);

        handle_frame(&client.inner, r#"{"msg_type":"ok","req_id":42}"#);

        let msg = rx.await.unwrap();
        assert!(matches!(msg, ServerMessage::Ok { req_id: 42 }));
        assert!(client.inner.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn symbol_errors_fan_out() {
        let client = WsFeedClient::new("wss://unused.invalid");
        let mut rx = client.events();

        handle_frame(
            &client.inner,
            r#"{"msg_type":"error","error":{"code":"Halted","message":"market closed","symbol":"EURUSD"}}"#,
        );

        match rx.recv().await.unwrap() {
            FeedEvent::SymbolError { symbol, message } => {
                assert_eq!(symbol, "EURUSD");
                assert_eq!(message, "market closed");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let client = WsFeedClient::new("wss://unused.invalid");
        // Must not panic, must not emit.
        handle_frame(&client.inner, "garbage");
        let mut rx = client.events();
        handle_frame(&client.inner, r#"{"msg_type":"nope"}"#);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn disconnect_fails_in_flight_requests() {
        let client = WsFeedClient::new("wss://unused.invalid");
        let (tx, rx) = oneshot::channel();
        client.inner.pending.lock().insert(7, tx);

        fail_pending(&client.inner);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn request_fails_fast_when_loop_not_running() {
        let client = WsFeedClient::new("wss://unused.invalid");
        // Simulate a dead connection task by dropping the receiver.
        client.outbound_rx.lock().take();

        let result = client
            .fetch_candle_history("EURUSD", 60, 10)
            .await;
        assert!(matches!(result, Err(EngineError::FeedUnavailable(_))));
    }
}
