//! In-memory event bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};

use gatehouse_core::SubscriptionId;
use thiserror::Error;

use crate::bus::{EventBus, Handler, Subscription};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// Broadcast failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,
}

type SharedHandler<M> = Arc<dyn Fn(&M) + Send + Sync>;

struct Registry<M> {
    handlers: HashMap<String, Vec<(SubscriptionId, SharedHandler<M>)>>,
    channels: HashMap<String, Vec<mpsc::Sender<M>>>,
}

impl<M> Default for Registry<M> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            channels: HashMap::new(),
        }
    }
}

/// In-process pub/sub bus.
///
/// - No IO / no async
/// - Handlers run on the broadcasting thread, outside the registry lock, so
///   a handler may broadcast or register further handlers
pub struct InMemoryEventBus<M> {
    registry: Mutex<Registry<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers currently registered under `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.registry
            .lock()
            .map(|r| r.handlers.get(name).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus").finish_non_exhaustive()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn broadcast(&self, name: &str, message: M) -> Result<(), Self::Error> {
        let handlers: Vec<SharedHandler<M>> = {
            let mut registry = self.registry.lock().map_err(|_| InMemoryBusError::Poisoned)?;

            if let Some(channels) = registry.channels.get_mut(name) {
                // Drop any dead subscribers while publishing.
                channels.retain(|tx| tx.send(message.clone()).is_ok());
            }

            registry
                .handlers
                .get(name)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        tracing::trace!(event = name, handlers = handlers.len(), "broadcast");
        for handler in handlers {
            handler(&message);
        }

        Ok(())
    }

    fn on(&self, name: &str, handler: Handler<M>) -> SubscriptionId {
        let id = SubscriptionId::new();

        // If the lock is poisoned the handler is never called, same as a
        // subscription that was registered on a dead bus.
        if let Ok(mut registry) = self.registry.lock() {
            registry
                .handlers
                .entry(name.to_string())
                .or_default()
                .push((id, Arc::from(handler)));
        }

        id
    }

    fn off(&self, id: SubscriptionId) -> bool {
        let Ok(mut registry) = self.registry.lock() else {
            return false;
        };

        let mut removed = false;
        for list in registry.handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        removed
    }

    fn subscribe(&self, name: &str) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        if let Ok(mut registry) = self.registry.lock() {
            registry.channels.entry(name.to_string()).or_default().push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn handlers_run_in_registration_order() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.on("tick", Box::new(move |n: &u32| seen.lock().unwrap().push(format!("{tag}:{n}"))));
        }

        bus.broadcast("tick", 7).unwrap();
        assert_eq!(*seen.lock().unwrap(), ["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn names_are_isolated() {
        let bus: InMemoryEventBus<&'static str> = InMemoryEventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on("a", Box::new(move |m: &&str| sink.lock().unwrap().push(*m)));

        bus.broadcast("b", "ignored").unwrap();
        bus.broadcast("a", "kept").unwrap();
        assert_eq!(*seen.lock().unwrap(), ["kept"]);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let bus: InMemoryEventBus<()> = InMemoryEventBus::new();
        let id = bus.on("x", Box::new(|_: &()| {}));
        bus.on("x", Box::new(|_: &()| {}));
        assert_eq!(bus.handler_count("x"), 2);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.handler_count("x"), 1);
    }

    #[test]
    fn handler_may_broadcast_reentrantly() {
        let bus: Arc<InMemoryEventBus<u32>> = Arc::new(InMemoryEventBus::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let inner = Arc::clone(&bus);
        bus.on("outer", Box::new(move |n: &u32| inner.broadcast("inner", n + 1).unwrap()));
        let sink = Arc::clone(&seen);
        bus.on("inner", Box::new(move |n: &u32| sink.lock().unwrap().push(*n)));

        bus.broadcast("outer", 1).unwrap();
        assert_eq!(*seen.lock().unwrap(), [2]);
    }

    #[test]
    fn subscriptions_receive_copies_and_dead_ones_are_dropped() {
        let bus: InMemoryEventBus<String> = InMemoryEventBus::new();
        let live = bus.subscribe("msg");
        let dead = bus.subscribe("msg");
        drop(dead);

        bus.broadcast("msg", "hello".to_string()).unwrap();
        bus.broadcast("other", "nope".to_string()).unwrap();

        assert_eq!(live.drain(), ["hello".to_string()]);
        assert!(live.try_recv().is_err());
    }
}
