// =============================================================================
// Borealis Signal Nexus — Main Entry Point
// =============================================================================
//
// Composition root: builds the feed client, the aggregator, and the session
// manager, wires the event bus, and runs until Ctrl+C. There are no global
// singletons; every component receives explicit handles, so tests can swap
// the feed for a mock.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod config;
mod error;
mod events;
mod feed;
mod indicators;
mod market_data;
mod prediction;
mod psychology;
mod session;
mod signals;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EngineEventBus};
use crate::feed::{FeedEvent, MarketFeed, WsFeedClient};
use crate::market_data::CandleAggregator;
use crate::session::SessionManager;

/// How long startup waits for the first feed connection before starting
/// sessions anyway (they will surface `FeedUnavailable` on their own).
const STARTUP_CONNECT_WAIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Borealis Signal Nexus — Starting Up              ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = EngineConfig::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    if let Ok(url) = std::env::var("BOREALIS_FEED_URL") {
        config.feed_url = url;
    }

    let symbols: Vec<String> = std::env::var("BOREALIS_SYMBOLS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    let timeframe_secs: u32 = std::env::var("BOREALIS_TIMEFRAME")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    info!(
        feed_url = %config.feed_url,
        symbols = ?symbols,
        timeframe_secs,
        min_confidence = config.signal.min_confidence,
        pre_close_seconds = config.signal.pre_close_seconds,
        "engine configured"
    );

    // ── 2. Build the pipeline ────────────────────────────────────────────
    let bus = EngineEventBus::new();
    let aggregator = Arc::new(CandleAggregator::new());

    let feed_client = WsFeedClient::new(config.feed_url.clone());
    feed_client.start();
    let feed: Arc<dyn MarketFeed> = Arc::new(feed_client.clone());

    let manager = SessionManager::new(feed.clone(), aggregator.clone(), config.clone(), bus.clone());
    manager.start();

    // ── 3. Downstream sink (stand-in for persistence / chat delivery) ────
    let mut sink_rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match sink_rx.recv().await {
                Ok(EngineEvent::PreCloseSignal { session, signal }) => {
                    info!(
                        session_id = %session.id,
                        subscriber_id = %session.subscriber_id,
                        symbol = %signal.symbol,
                        direction = %signal.direction,
                        confidence = signal.confidence,
                        p_up = signal.p_up,
                        votes = signal.votes.len(),
                        volatility_override = signal.volatility_override,
                        "signal delivered"
                    );
                }
                Ok(EngineEvent::SessionStarted(session)) => {
                    info!(session_id = %session.id, symbol = %session.symbol, "session started event");
                }
                Ok(EngineEvent::SessionStopped(session)) => {
                    info!(session_id = %session.id, symbol = %session.symbol, "session stopped event");
                }
                Ok(EngineEvent::FeedDisconnected) => {
                    warn!("feed disconnected event");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event sink lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── 4. Wait for the feed, then start configured sessions ────────────
    let mut feed_events = feed.events();
    let connected = feed.is_connected()
        || tokio::time::timeout(STARTUP_CONNECT_WAIT, async {
            loop {
                match feed_events.recv().await {
                    Ok(FeedEvent::Connected) => break true,
                    Ok(_) => {}
                    Err(_) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);

    if !connected {
        warn!("feed not connected yet; sessions will retry through the feed's own backoff");
    }

    let mut session_ids = Vec::new();
    for symbol in &symbols {
        let id = uuid::Uuid::new_v4().to_string();
        match manager
            .start_session(&id, "local", symbol, timeframe_secs, None)
            .await
        {
            Ok(session) => {
                info!(session_id = %session.id, symbol = %symbol, "session launched");
                session_ids.push(id);
            }
            Err(e) => error!(symbol = %symbol, error = %e, "failed to start session"),
        }
    }

    info!(
        sessions = session_ids.len(),
        "All subsystems running. Press Ctrl+C to stop."
    );

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    for id in &session_ids {
        if let Err(e) = manager.stop_session(id).await {
            error!(session_id = %id, error = %e, "failed to stop session");
        }
    }

    if let Err(e) = config.save("engine_config.json") {
        error!(error = %e, "Failed to save engine config on shutdown");
    }

    info!("Borealis Signal Nexus shut down complete.");
    Ok(())
}
