//! `gatehouse-events`: named publish/subscribe plumbing.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{EventBus, Handler, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
