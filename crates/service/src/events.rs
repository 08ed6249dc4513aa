//! Outbound notifications.
//!
//! The fulfillment core never talks to a chat transport directly. It
//! emits [`OutboundEvent`]s through an [`EventSink`]; the transport
//! layer subscribes and renders them however it likes. Delivery is
//! best-effort fan-out, a dead subscriber never blocks fulfillment.

use std::sync::mpsc::Receiver;
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use linkvend_core::id::{ProductId, TransactionId, UserId};
use serde::{Deserialize, Serialize};

/// Notification produced by the fulfillment service for the transport
/// layer to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A purchase was approved and the buyer should receive their link.
    GrantIssued {
        user_id: UserId,
        transaction_id: TransactionId,
        product_name: String,
        link: String,
    },
    /// A buyer submitted a payment receipt; moderators should review it.
    ModerationRequested {
        transaction_id: TransactionId,
        user_id: UserId,
        product_name: String,
        price_charged: u64,
        receipt_ref: String,
    },
    /// A purchase was rejected and the buyer should be told why.
    RejectionNotice {
        transaction_id: TransactionId,
        user_id: UserId,
        reason: String,
        notification_ref: String,
    },
    /// An approval failed because the product has no unused links left.
    LowInventoryAlert {
        product_id: ProductId,
        product_name: String,
        transaction_id: TransactionId,
    },
}

/// Fire-and-forget sink for outbound events.
///
/// Emission is infallible by contract: fulfillment state has already
/// been committed by the time an event is emitted, so a sink that
/// cannot deliver must drop (and log) rather than fail the operation.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutboundEvent);
}

/// A subscription to the outbound event stream. Each subscriber gets a
/// copy of every event emitted after it subscribed.
#[derive(Debug)]
pub struct Subscription {
    receiver: Receiver<OutboundEvent>,
}

impl Subscription {
    /// Block until the next event is available.
    pub fn recv(&self) -> Result<OutboundEvent, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Result<OutboundEvent, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for an event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<OutboundEvent, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// In-memory pub/sub sink backed by std channels.
///
/// - No IO / no async
/// - Best-effort fan-out
/// - Subscribers that hang up are dropped on the next emit
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    subscribers: Mutex<Vec<mpsc::Sender<OutboundEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription { receiver: rx }
    }
}

impl EventSink for InMemoryEventBus {
    fn emit(&self, event: OutboundEvent) {
        let mut subs = match self.subscribers.lock() {
            Ok(subs) => subs,
            Err(_) => {
                tracing::warn!("event bus lock poisoned; dropping event");
                return;
            }
        };

        // Drop any dead subscribers while emitting.
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutboundEvent {
        OutboundEvent::RejectionNotice {
            transaction_id: TransactionId::new(),
            user_id: UserId::new(7),
            reason: "illegible receipt".to_string(),
            notification_ref: "msg-42".to_string(),
        }
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let bus = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        let event = sample();
        bus.emit(event.clone());

        assert_eq!(a.try_recv().unwrap(), event);
        assert_eq!(b.try_recv().unwrap(), event);
    }

    #[test]
    fn dead_subscriber_does_not_block_emit() {
        let bus = InMemoryEventBus::new();
        drop(bus.subscribe());
        let live = bus.subscribe();

        bus.emit(sample());
        assert!(live.try_recv().is_ok());
    }

    #[test]
    fn events_before_subscribe_are_not_replayed() {
        let bus = InMemoryEventBus::new();
        bus.emit(sample());

        let late = bus.subscribe();
        assert!(late.try_recv().is_err());
    }
}
