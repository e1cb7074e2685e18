//! # bus
//!
//! In-process fan-out of replay events to live subscribers.
//!
//! Built on `tokio::sync::broadcast`: the producer never blocks, each
//! subscriber gets per-subscriber FIFO delivery, and a subscriber that falls
//! more than the buffer bound behind loses the *oldest* messages (surfaced as
//! `RecvError::Lagged`, which the subscribe loops turn into a drop counter).
//! Drop-oldest is load-bearing: any back-pressure alternative would let a slow
//! subscriber stall ingestion and break replay determinism.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ais_types::Alert;
use serde::Serialize;
use tokio::sync::broadcast;

/// Default per-subscriber mailbox bound.
pub const EVENT_BUFFER: usize = 256;

/// One message on the bus, serialized as `{"kind": ..., ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BusEvent {
    /// A persisted alert
    Alert { data: Alert },
    /// Cumulative processed-point counter
    Tick { processed: u64 },
    /// Terminal session error
    Error { message: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish to all current subscribers. Nobody listening is fine.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Record `n` messages lost by a lagging subscriber.
    pub fn record_lag(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Total messages dropped across all subscribers since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn per_subscriber_fifo() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(BusEvent::Tick { processed: i });
        }
        for i in 0..5 {
            match rx.recv().await.unwrap() {
                BusEvent::Tick { processed } => assert_eq!(processed, i),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_not_newest() {
        let bus = EventBus::with_capacity(4);
        let mut rx = bus.subscribe();
        // Producer runs far ahead without ever blocking
        for i in 0..10 {
            bus.publish(BusEvent::Tick { processed: i });
        }
        match rx.recv().await {
            Err(RecvError::Lagged(n)) => bus.record_lag(n),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(bus.dropped() > 0);
        // What survives is the tail of the stream, still in order
        let mut seen = Vec::new();
        while let Ok(BusEvent::Tick { processed }) = rx.try_recv() {
            seen.push(processed);
        }
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().unwrap(), 9);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn events_serialize_with_kind_tags() {
        let tick = serde_json::to_value(BusEvent::Tick { processed: 42 }).unwrap();
        assert_eq!(tick["kind"], "tick");
        assert_eq!(tick["processed"], 42);

        let err = serde_json::to_value(BusEvent::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(err["kind"], "error");
        assert_eq!(err["message"], "boom");
    }
}
