//! Typed publish/subscribe.
//!
//! A [`Subscription`] is the only way to listen and dropping it is the
//! unsubscribe, so a listener cannot outlive its owner.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = Uuid::new_v4();
        trace!(%id, "Subscribed");
        Subscription {
            id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish to every live subscriber, returning how many there were.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription<E> {
    id: Uuid,
    receiver: broadcast::Receiver<E>,
}

impl<E: Clone> Subscription<E> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next event. `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(id = %self.id, skipped, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting.
    pub fn try_next(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(id = %self.id, skipped, "Subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        trace!(id = %self.id, "Unsubscribed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        assert_eq!(bus.publish("ping"), 1);
        assert_eq!(sub.recv().await, Some("ping"));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::<u32>::new(8);
        let a = bus.subscribe();
        let b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(a);
        assert_eq!(bus.subscriber_count(), 1);
        drop(b);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(1), 0);
    }

    #[test]
    fn test_drain_in_order() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        for i in 0..3 {
            bus.publish(i);
        }
        assert_eq!(sub.drain(), vec![0, 1, 2]);
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_lagging_subscriber_keeps_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(i);
        }
        assert_eq!(sub.drain(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_closed() {
        let bus = EventBus::<u32>::new(2);
        let mut sub = bus.subscribe();
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }
}
