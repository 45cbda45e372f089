//! Named publish/subscribe abstraction (mechanics only).
//!
//! Messages are broadcast under an event *name*. Two kinds of consumers can
//! listen to a name:
//!
//! - **Handlers** registered with [`EventBus::on`] run synchronously, in
//!   registration order, on the broadcasting thread. This is what UI glue
//!   uses to react to session changes.
//! - **Subscriptions** returned by [`EventBus::subscribe`] receive a copy of
//!   every message through a channel, for consumers living on another thread.
//!
//! There is no persistence and no replay: a consumer only sees messages
//! broadcast after it registered.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use gatehouse_core::SubscriptionId;

/// Callback invoked with every message broadcast under a name.
pub type Handler<M> = Box<dyn Fn(&M) + Send + Sync>;

/// A channel-backed subscription to one event name.
///
/// ## Usage Pattern
///
/// ```ignore
/// let subscription = bus.subscribe("event:auth-logoutConfirmed");
///
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(event) => handle(event),
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,  // Check for shutdown
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,  // Bus dropped
///     }
/// }
/// ```
///
/// Dropping the subscription unregisters it on the next broadcast.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every message that is already queued.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Name-routed event bus.
///
/// ## Delivery
///
/// - `broadcast` delivers to every handler registered under `name`, in
///   registration order, before it returns.
/// - Channel subscriptions under `name` get a clone of the message.
/// - Messages broadcast under a name nobody listens to are dropped.
///
/// ## Errors
///
/// `broadcast` can fail for implementation reasons (lock poisoning, a
/// remote transport being down). Callers decide whether that matters; the
/// authentication engine logs and carries on.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    fn broadcast(&self, name: &str, message: M) -> Result<(), Self::Error>;

    /// Register `handler` for messages broadcast under `name`.
    fn on(&self, name: &str, handler: Handler<M>) -> SubscriptionId;

    /// Remove a handler registered with [`EventBus::on`]. Returns whether it existed.
    fn off(&self, id: SubscriptionId) -> bool;

    fn subscribe(&self, name: &str) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn broadcast(&self, name: &str, message: M) -> Result<(), Self::Error> {
        (**self).broadcast(name, message)
    }

    fn on(&self, name: &str, handler: Handler<M>) -> SubscriptionId {
        (**self).on(name, handler)
    }

    fn off(&self, id: SubscriptionId) -> bool {
        (**self).off(id)
    }

    fn subscribe(&self, name: &str) -> Subscription<M> {
        (**self).subscribe(name)
    }
}
