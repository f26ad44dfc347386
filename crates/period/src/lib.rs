//! Accounting period module (fiscal time boundaries).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod period;

pub use period::{
    AccountingPeriod, ClosePeriod, CreatePeriod, PeriodClosed, PeriodCommand, PeriodCreated,
    PeriodEvent, PeriodId, PeriodReopened, PeriodType, PeriodUpdated, ReopenPeriod, UpdatePeriod,
};
