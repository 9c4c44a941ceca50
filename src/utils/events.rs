//! Typed event dispatcher
//!
//! Each coordinator owns one dispatcher for its own event type. Consumers
//! either register a callback (and unsubscribe it explicitly) or take a
//! broadcast receiver for async consumption.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

/// Publish/subscribe dispatcher for a single event type
pub struct EventDispatcher<E> {
    handlers: Arc<Mutex<Vec<(SubscriptionId, Handler<E>)>>>,
    tx: broadcast::Sender<E>,
}

impl<E> Clone for EventDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> EventDispatcher<E> {
    /// Create a dispatcher whose broadcast buffer holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Arc::new(Mutex::new(Vec::new())),
            tx,
        }
    }

    /// Register a callback invoked synchronously for every event
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a callback. Returns false if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Receiver for async consumers. Dropping it unsubscribes.
    pub fn receiver(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Deliver an event to every callback, then to broadcast receivers
    pub fn emit(&self, event: E) {
        // Snapshot so handlers may subscribe or unsubscribe re-entrantly
        let handlers: Vec<Handler<E>> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler(&event);
        }

        // No receivers is not an error
        let _ = self.tx.send(event);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}
