//! Event bus - pub/sub for loop activity
//!
//! Uses a tokio broadcast channel. Components emit events, consumers
//! (the log subscriber, tests) subscribe.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::types::LoopEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

pub struct EventBus {
    tx: broadcast::Sender<LoopEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: LoopEvent) {
        debug!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

/// Spawn a subscriber that mirrors every event into the tracing log
pub fn spawn_log_subscriber(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "troika::events", event_type = event.event_type(), %json),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event log subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{Phase, PhaseOutcome};
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_subscribe_counts() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(LoopEvent::PhaseCompleted {
            iteration: 1,
            phase: Phase::Plan,
            outcome: PhaseOutcome::Succeeded,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "PhaseCompleted");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        bus.emit(LoopEvent::IterationStarted { iteration: 1 });
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(LoopEvent::IterationStarted { iteration: 7 });

        assert!(matches!(rx1.recv().await.unwrap(), LoopEvent::IterationStarted { iteration: 7 }));
        assert!(matches!(rx2.recv().await.unwrap(), LoopEvent::IterationStarted { iteration: 7 }));
    }
}
