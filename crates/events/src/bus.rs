//! Round event publisher over a tokio broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{Event, EventEnvelope};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1000;

/// Publishes round lifecycle events to every subscriber.
///
/// Each emitted event is stamped with the next sequence number of this bus,
/// so subscribers can tell when they lagged and lost events. Clones share
/// the channel and the sequence.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Last sequence number handed out
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` events per lagging
    /// subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wrap an event in an envelope and publish it.
    ///
    /// Returns the number of subscribers that received the event.
    /// With no subscribers the event is dropped and 0 is returned; it still
    /// consumes a sequence number.
    pub fn emit(&self, event: Event) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let event_type = event.event_type();
        let round_id = event.round_id().map(str::to_string);
        let team_id = event.team_id().map(str::to_string);

        let delivered = self
            .sender
            .send(EventEnvelope::sequenced(event, sequence))
            .unwrap_or(0);

        debug!(
            event_type,
            sequence,
            round_id = round_id.as_deref().unwrap_or("-"),
            team_id = team_id.as_deref().unwrap_or("-"),
            delivered,
            "Event emitted"
        );
        delivered
    }

    /// Subscribe to events
    ///
    /// Events emitted before subscribing are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total number of events emitted, which is also the sequence number of
    /// the latest one
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(team: &str) -> Event {
        Event::PlanSubmitted {
            round_id: "R1".to_string(),
            team_id: team.to_string(),
            action_count: 1,
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(submitted("T1")), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.event, submitted("T1"));
    }

    #[tokio::test]
    async fn test_subscribers_see_same_order_and_sequence() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.emit(submitted("T1")), 2);
        assert_eq!(bus.emit(submitted("T2")), 2);

        for rx in [&mut rx1, &mut rx2] {
            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            assert_eq!(first.event.team_id(), Some("T1"));
            assert_eq!(second.event.team_id(), Some("T2"));
            assert_eq!(second.sequence, first.sequence + 1);
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_still_advances_sequence() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(submitted("T1")), 0);

        let mut rx = bus.subscribe();
        bus.emit(submitted("T2"));
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_sees_gap() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();

        for team in ["T1", "T2", "T3", "T4"] {
            bus.emit(submitted(team));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn test_event_count() {
        let bus = EventBus::new();
        assert_eq!(bus.event_count(), 0);

        bus.emit(Event::Error {
            message: "test".to_string(),
            context: None,
        });
        bus.emit(Event::SimulationReset { teams: 2 });
        assert_eq!(bus.event_count(), 2);
    }

    #[test]
    fn test_clone_shares_channel_and_sequence() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _rx = bus2.subscribe();
        assert_eq!(bus1.subscriber_count(), 1);
        bus2.emit(submitted("T1"));
        bus1.emit(submitted("T2"));
        assert_eq!(bus1.event_count(), 2);
        assert_eq!(bus2.event_count(), 2);
    }
}
