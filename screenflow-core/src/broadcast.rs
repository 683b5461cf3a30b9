//! Lossy fan-out to any number of subscribers.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Publishes values to every live subscriber without ever blocking.
///
/// Each subscriber owns a bounded queue, one slot by default. A publish that finds the slot
/// occupied drops the value for that subscriber only; a subscriber whose
/// receiver was dropped is pruned on the next publish.
#[derive(Debug)]
pub struct Broadcaster<T> {
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Broadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber with a one-slot queue.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        self.subscribe_with_capacity(1)
    }

    /// Register a subscriber that may lag by up to `capacity` values.
    pub fn subscribe_with_capacity(&self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.lock().push(tx);
        rx
    }

    /// Offer `value` to every subscriber; returns how many accepted it.
    pub fn publish(&self, value: T) -> usize {
        let mut delivered = 0;
        self.lock().retain(|tx| match tx.try_send(value.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    /// Subscribers retained after the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_subscriber_drops_without_blocking_others() {
        let b = Broadcaster::new();
        let mut slow = b.subscribe();
        let mut fast = b.subscribe();

        assert_eq!(b.publish(1), 2);
        assert_eq!(fast.try_recv().unwrap(), 1);

        // `slow` still holds 1, so 2 is dropped for it only.
        assert_eq!(b.publish(2), 1);
        assert_eq!(slow.try_recv().unwrap(), 1);
        assert!(slow.try_recv().is_err());
        assert_eq!(fast.try_recv().unwrap(), 2);
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let b = Broadcaster::new();
        let rx = b.subscribe();
        let _keep = b.subscribe();
        drop(rx);

        assert_eq!(b.publish("x"), 1);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let b: Broadcaster<u8> = Broadcaster::new();
        assert_eq!(b.publish(7), 0);
    }
}
