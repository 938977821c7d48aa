//! Event system: structured events and the fan-out bus that carries them.

pub mod bus;
pub mod event;

pub use bus::{EventBus, Subscription};
pub use event::{Event, EventType};
