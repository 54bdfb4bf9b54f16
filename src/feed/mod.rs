// =============================================================================
// Market-Data Feed Module
// =============================================================================
//
// One process-wide connection to the upstream provider, behind the
// `MarketFeed` trait so the session manager can be driven by a mock in tests.

pub mod client;
pub mod protocol;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::EngineError;
use crate::market_data::{Candle, Tick};

pub use client::WsFeedClient;

/// Notifications fanned out to feed consumers.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The connection is up and every active subscription has been re-issued.
    Connected,
    Disconnected,
    Tick(Tick),
    /// Protocol-level fault scoped to one symbol; the subscriber decides.
    SymbolError { symbol: String, message: String },
}

/// The feed surface the engine consumes.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// The `count` most recent closed candles, oldest first.
    async fn fetch_candle_history(
        &self,
        symbol: &str,
        timeframe_secs: u32,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError>;

    /// Reference-counted subscription; the first subscriber per symbol
    /// triggers the protocol-level subscribe.
    async fn subscribe_ticks(&self, symbol: &str, subscriber_id: &str) -> Result<(), EngineError>;

    /// Decrement the reference count; the last unsubscriber triggers the
    /// protocol-level forget.
    async fn unsubscribe_ticks(&self, symbol: &str, subscriber_id: &str)
        -> Result<(), EngineError>;

    /// Lock-free connection snapshot.
    fn is_connected(&self) -> bool;

    /// Register a new event listener.
    fn events(&self) -> broadcast::Receiver<FeedEvent>;
}

// ── Subscription reference counting ──────────────────────────────────────────

/// Pure bookkeeping for per-symbol subscriber sets. The caller owns locking
/// and decides when a protocol-level subscribe / forget is required.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    subscribers: HashMap<String, HashSet<String>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscriber. Returns `true` when this is the symbol's first
    /// subscriber and a protocol-level subscribe must be issued.
    pub fn add(&mut self, symbol: &str, subscriber_id: &str) -> bool {
        let set = self.subscribers.entry(symbol.to_string()).or_default();
        let was_empty = set.is_empty();
        set.insert(subscriber_id.to_string());
        was_empty
    }

    /// Drop a subscriber. Returns `true` when the symbol has no subscribers
    /// left and a protocol-level forget must be issued.
    pub fn remove(&mut self, symbol: &str, subscriber_id: &str) -> bool {
        match self.subscribers.get_mut(symbol) {
            Some(set) => {
                set.remove(subscriber_id);
                if set.is_empty() {
                    self.subscribers.remove(symbol);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Every symbol with at least one subscriber (for resubscribe-on-connect).
    pub fn symbols(&self) -> Vec<String> {
        self.subscribers.keys().cloned().collect()
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.subscribers.get(symbol).map_or(0, HashSet::len)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_subscriber_triggers_subscribe() {
        let mut table = SubscriptionTable::new();
        assert!(table.add("EURUSD", "sess-1"));
        assert!(!table.add("EURUSD", "sess-2"));
        assert_eq!(table.subscriber_count("EURUSD"), 2);
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let mut table = SubscriptionTable::new();
        assert!(table.add("EURUSD", "sess-1"));
        assert!(!table.add("EURUSD", "sess-1"));
        assert_eq!(table.subscriber_count("EURUSD"), 1);
    }

    #[test]
    fn last_unsubscriber_triggers_forget() {
        let mut table = SubscriptionTable::new();
        table.add("EURUSD", "sess-1");
        table.add("EURUSD", "sess-2");

        assert!(!table.remove("EURUSD", "sess-1"));
        assert!(table.remove("EURUSD", "sess-2"));
        assert_eq!(table.subscriber_count("EURUSD"), 0);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut table = SubscriptionTable::new();
        assert!(!table.remove("EURUSD", "ghost"));
        table.add("EURUSD", "sess-1");
        assert!(!table.remove("GBPUSD", "sess-1"));
    }

    #[test]
    fn symbols_lists_active_only() {
        let mut table = SubscriptionTable::new();
        table.add("EURUSD", "a");
        table.add("GBPUSD", "b");
        table.remove("GBPUSD", "b");

        let symbols = table.symbols();
        assert_eq!(symbols, vec!["EURUSD".to_string()]);
    }
}
