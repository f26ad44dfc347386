//! Read-model projections over the published event streams.
//!
//! Read models are disposable; events are the source of truth. Projections
//! must be idempotent (at-least-once delivery) and can be rebuilt from
//! scratch at any time.

pub mod account_balances;

pub use account_balances::{AccountBalance, AccountBalances, ProjectionError};
