//! `ledgerkit-observability` — process-wide tracing/logging setup.

pub mod tracing;

pub use tracing::init;
