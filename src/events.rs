// =============================================================================
// Engine Event Bus — typed publish/subscribe for downstream collaborators
// =============================================================================
//
// The chat front-end and the persistence sink both attach here. Emissions
// with no live subscriber are dropped; the engine never blocks on a slow or
// absent consumer.

use tokio::sync::broadcast;

use crate::session::Session;
use crate::signals::SignalResult;

/// Events emitted by the engine to external collaborators.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A pre-close signal fired for an active session.
    PreCloseSignal {
        session: Session,
        signal: SignalResult,
    },
    SessionStarted(Session),
    SessionStopped(Session),
    FeedDisconnected,
}

/// Broadcast-backed event bus. Cloning is cheap; every clone publishes to the
/// same channel.
#[derive(Clone)]
pub struct EngineEventBus {
    tx: broadcast::Sender<EngineEvent>,
}

/// Buffered events per subscriber before lagging subscribers start missing
/// messages.
const BUS_CAPACITY: usize = 256;

impl EngineEventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Register a new subscriber. Each receiver sees every event published
    /// after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns the number of subscribers that received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EngineEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let bus = EngineEventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(EngineEvent::FeedDisconnected), 0);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = EngineEventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(EngineEvent::FeedDisconnected), 2);

        assert!(matches!(
            rx1.recv().await.unwrap(),
            EngineEvent::FeedDisconnected
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            EngineEvent::FeedDisconnected
        ));
    }
}
