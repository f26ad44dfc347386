//! `ledgerkit-events` — domain event fabric.
//!
//! Events are the outbound notification surface of the accounting core:
//! every mutating operation emits one, and downstream consumers (reporting,
//! audit log, notifications) subscribe via the bus. The core never calls
//! consumers directly: publish is fire-and-forget, not RPC.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::InMemoryEventBus;
