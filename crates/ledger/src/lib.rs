//! General ledger module (immutable account impacts and trial balances).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod general_ledger;
pub mod trial_balance;

pub use general_ledger::{
    CreateLedgerEntry, GeneralLedgerEntry, LedgerEntryCommand, LedgerEntryCreated,
    LedgerEntryEvent, LedgerEntryId, LedgerEntryPosted, LedgerEntryUpdated, PostLedgerEntry,
    UpdateLedgerEntry,
};
pub use trial_balance::{
    AccountType, AddLineItem, CreateTrialBalance, FinalizeTrialBalance, ReopenTrialBalance,
    TrialBalance, TrialBalanceCommand, TrialBalanceCreated, TrialBalanceEvent,
    TrialBalanceFinalized, TrialBalanceId, TrialBalanceLineItem, TrialBalanceLineItemAdded,
    TrialBalanceReopened, TrialBalanceStatus, TrialBalanceTotals,
};
