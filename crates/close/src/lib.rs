//! Fiscal period close module (checklist-gated close workflow).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod close;

pub use close::{
    AddValidationIssue, AttachTrialBalance, CloseCompleted, CloseInitiated, CloseReopened,
    CloseStatus, CloseTask, CloseTaskCompleted, CloseTaskItem, CloseType, CloseValidationIssue,
    CompleteClose, CompleteCloseTask, FiscalPeriodClose, InitiateClose, NetIncomeRecorded,
    PeriodCloseCommand,
    PeriodCloseEvent, PeriodCloseId, RecordNetIncome, ReopenClose, ResolveValidationIssue,
    Severity, TrialBalanceAttached, ValidationIssueFound, ValidationIssueResolved,
};
