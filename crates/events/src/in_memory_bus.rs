//! In-memory event bus for tests/dev.

use std::sync::RwLock;
use std::sync::mpsc;

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    /// Publish failed because the subscriber registry lock was poisoned.
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// Fan-out is best effort and synchronous: `publish` pushes a clone of the
/// message into every live subscriber channel before returning, which is
/// exactly what the single-writer accounting pipeline needs in tests.
/// Disconnected subscribers are pruned on the next publish.
#[derive(Debug, Default)]
pub struct InMemoryEventBus<M> {
    subscribers: RwLock<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Number of live subscriptions (as of the last publish-time pruning).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self
            .subscribers
            .write()
            .map_err(|_| InMemoryBusError::Poisoned)?;

        // Send to everyone still listening, dropping dead channels.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // On a poisoned lock we still hand out a subscription; it just
        // never receives anything.
        if let Ok(mut subs) = self.subscribers.write() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}
