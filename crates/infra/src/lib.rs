//! Infrastructure layer: event store, command dispatch, posting
//! orchestration and read-model projections.
//!
//! This crate contains no IO of its own; the store and bus are traits with
//! in-memory implementations for tests/dev, swappable for real backends.

pub mod command_dispatcher;
pub mod event_store;
pub mod posting;
pub mod projections;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use posting::{AccountDirectory, AccountInfo, PostingService};
pub use projections::{AccountBalance, AccountBalances, ProjectionError};
