//! # Event System
//!
//! Buffered publish/subscribe between systems.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  send   ┌─────────────┐ dispatch ┌─────────────┐
//! │   Systems   │────────>│   Channel   │─────────>│ Subscribers │
//! │ (senders)   │         │  (buffered) │          │ (callbacks) │
//! └─────────────┘         └─────────────┘          └─────────────┘
//! ```
//!
//! Events are queued on a crossbeam channel and only delivered when
//! [`EventHandler::dispatch`] runs. The engine dispatches twice per tick:
//! after systems have run and after destroyed entities are reclaimed.
//!
//! A dispatch delivers exactly the events queued when it started, in send
//! order. Events sent by callbacks wait for the next dispatch.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace};

/// Marker trait for values that can be sent through the event system.
///
/// # Example
///
/// ```rust,ignore
/// struct EntityDied { entity: EntityId }
/// impl Event for EntityDied {}
/// ```
pub trait Event: Any + Send {}

/// Identifier returned by [`EventHandler::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct QueuedEvent {
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any + Send>,
}

type Callback = Box<dyn FnMut(&dyn Any) + Send>;

struct Subscription {
    id: SubscriptionId,
    callback: Callback,
}

/// Handle for sending events. Cheap to clone; systems keep their own.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<QueuedEvent>,
}

impl EventSender {
    /// Queues an event for the next dispatch.
    ///
    /// Returns `false` if the handler has been dropped.
    #[inline]
    pub fn send<E: Event>(&self, event: E) -> bool {
        self.sender
            .send(QueuedEvent {
                type_id: TypeId::of::<E>(),
                type_name: type_name::<E>(),
                payload: Box::new(event),
            })
            .is_ok()
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Owns the event queue and every subscription.
pub struct EventHandler {
    sender: Sender<QueuedEvent>,
    receiver: Receiver<QueuedEvent>,
    subscribers: HashMap<TypeId, Vec<Subscription>>,
    next_subscription: u64,
}

impl EventHandler {
    /// Creates an empty handler.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            subscribers: HashMap::new(),
            next_subscription: 0,
        }
    }

    /// Registers `callback` for every future event of type `E`.
    ///
    /// Callbacks of one type run in subscription order.
    pub fn subscribe<E, F>(&mut self, mut callback: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        let callback: Callback = Box::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                callback(event);
            }
        });

        self.subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscription { id, callback });

        debug!(target: "EventHandler", event = type_name::<E>(), subscription = id.0, "subscribed");
        id
    }

    /// Removes a subscription. Returns `false` if it was not found.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subscriptions in self.subscribers.values_mut() {
            if let Some(position) = subscriptions.iter().position(|sub| sub.id == id) {
                subscriptions.remove(position);
                return true;
            }
        }
        false
    }

    /// A new sender handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Queues an event for the next dispatch.
    #[inline]
    pub fn send<E: Event>(&self, event: E) {
        // The handler owns the receiver, so this cannot disconnect
        let _ = self.sender.send(QueuedEvent {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
            payload: Box::new(event),
        });
    }

    /// Delivers every event queued before this call.
    ///
    /// Returns the number of events delivered.
    pub fn dispatch(&mut self) -> usize {
        let pending = self.receiver.len();
        let mut delivered = 0;

        for _ in 0..pending {
            let Ok(event) = self.receiver.try_recv() else {
                break;
            };
            delivered += 1;

            let Some(subscriptions) = self.subscribers.get_mut(&event.type_id) else {
                trace!(target: "EventHandler", event = event.type_name, "no subscribers");
                continue;
            };
            for subscription in subscriptions.iter_mut() {
                (subscription.callback)(&*event.payload);
            }
        }

        delivered
    }

    /// Number of events waiting for dispatch.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Number of subscriptions for events of type `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.subscribers.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Drops every queued event without delivering it.
    pub fn clear(&mut self) -> usize {
        self.receiver.try_iter().count()
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("pending", &self.receiver.len())
            .field("event_types", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl Event for Ping {}

    struct Pong;
    impl Event for Pong {}

    #[test]
    fn test_events_wait_for_dispatch() {
        let mut handler = EventHandler::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handler.subscribe(move |ping: &Ping| sink.lock().push(ping.0));

        handler.send(Ping(1));
        handler.sender().send(Ping(2));
        assert!(seen.lock().is_empty());
        assert_eq!(handler.pending_count(), 2);

        assert_eq!(handler.dispatch(), 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[test]
    fn test_only_matching_type_is_delivered() {
        let mut handler = EventHandler::new();
        let pings = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&pings);
        handler.subscribe(move |_: &Ping| *counter.lock() += 1);

        handler.send(Pong);
        handler.send(Ping(0));
        handler.dispatch();
        assert_eq!(*pings.lock(), 1);
    }

    #[test]
    fn test_events_sent_during_dispatch_are_deferred() {
        let mut handler = EventHandler::new();
        let sender = handler.sender();
        let pongs = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&pongs);

        handler.subscribe(move |_: &Ping| {
            sender.send(Pong);
        });
        handler.subscribe(move |_: &Pong| *counter.lock() += 1);

        handler.send(Ping(1));
        assert_eq!(handler.dispatch(), 1);
        assert_eq!(*pongs.lock(), 0);
        assert_eq!(handler.pending_count(), 1);

        assert_eq!(handler.dispatch(), 1);
        assert_eq!(*pongs.lock(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let mut handler = EventHandler::new();
        let id = handler.subscribe(|_: &Ping| {});
        handler.subscribe(|_: &Ping| {});
        assert_eq!(handler.subscriber_count::<Ping>(), 2);

        assert!(handler.unsubscribe(id));
        assert!(!handler.unsubscribe(id));
        assert_eq!(handler.subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn test_clear_drops_queue() {
        let mut handler = EventHandler::new();
        handler.send(Ping(1));
        handler.send(Pong);
        assert_eq!(handler.clear(), 2);
        assert_eq!(handler.dispatch(), 0);
    }
}
