use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject};
use ledgerkit_events::{Command, Event};
use ledgerkit_ledger::TrialBalanceId;
use ledgerkit_period::PeriodId;

/// Fiscal period close identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodCloseId(pub AggregateId);

impl PeriodCloseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PeriodCloseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Close cadence; determines which standard tasks are seeded and required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseType {
    MonthEnd,
    QuarterEnd,
    YearEnd,
}

/// Close workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    InProgress,
    Completed,
    Reopened,
}

/// Validation issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Stable close-task codes.
///
/// Tasks are identified by this enum rather than display-name strings, so
/// unknown-task failures are impossible to misspell and transition logic is
/// exhaustiveness-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTask {
    GenerateTrialBalance,
    VerifyTrialBalanceBalanced,
    PostAllJournalEntries,
    CompleteBankReconciliations,
    ReconcileApSubsidiaryLedger,
    ReconcileArSubsidiaryLedger,
    PostFixedAssetDepreciation,
    AmortizePrepaidExpenses,
    PostAccruals,
    ReconcileIntercompanyTransactions,
    ReconcileInventory,
    TransferNetIncomeToRetainedEarnings,
    PostClosingEntries,
}

impl CloseTask {
    /// Human-readable checklist label.
    pub fn label(self) -> &'static str {
        match self {
            CloseTask::GenerateTrialBalance => "Generate Trial Balance",
            CloseTask::VerifyTrialBalanceBalanced => "Verify Trial Balance Balanced",
            CloseTask::PostAllJournalEntries => "Post All Journal Entries",
            CloseTask::CompleteBankReconciliations => "Complete Bank Reconciliations",
            CloseTask::ReconcileApSubsidiaryLedger => "Reconcile AP Subsidiary Ledger",
            CloseTask::ReconcileArSubsidiaryLedger => "Reconcile AR Subsidiary Ledger",
            CloseTask::PostFixedAssetDepreciation => "Post Fixed Asset Depreciation",
            CloseTask::AmortizePrepaidExpenses => "Amortize Prepaid Expenses",
            CloseTask::PostAccruals => "Post Accruals",
            CloseTask::ReconcileIntercompanyTransactions => {
                "Reconcile Inter-company Transactions"
            }
            CloseTask::ReconcileInventory => "Reconcile Inventory",
            CloseTask::TransferNetIncomeToRetainedEarnings => {
                "Transfer Net Income to Retained Earnings"
            }
            CloseTask::PostClosingEntries => "Post Closing Entries",
        }
    }

    /// Whether this task is seeded for the given close type and, if so,
    /// whether it is required. `None` means the task is not part of that
    /// close at all.
    pub fn seeding(self, close_type: CloseType) -> Option<bool> {
        use CloseTask::*;
        use CloseType::*;
        match self {
            GenerateTrialBalance
            | VerifyTrialBalanceBalanced
            | PostAllJournalEntries
            | CompleteBankReconciliations
            | ReconcileApSubsidiaryLedger
            | ReconcileArSubsidiaryLedger
            | AmortizePrepaidExpenses
            | PostAccruals => Some(true),
            PostFixedAssetDepreciation => Some(matches!(close_type, MonthEnd | YearEnd)),
            ReconcileIntercompanyTransactions => Some(false),
            ReconcileInventory => Some(matches!(close_type, YearEnd)),
            TransferNetIncomeToRetainedEarnings | PostClosingEntries => match close_type {
                YearEnd => Some(true),
                _ => None,
            },
        }
    }

    /// Ordered standard checklist for a close type: (task, required).
    pub fn standard_tasks(close_type: CloseType) -> Vec<(CloseTask, bool)> {
        use CloseTask::*;
        [
            GenerateTrialBalance,
            VerifyTrialBalanceBalanced,
            PostAllJournalEntries,
            CompleteBankReconciliations,
            ReconcileApSubsidiaryLedger,
            ReconcileArSubsidiaryLedger,
            PostFixedAssetDepreciation,
            AmortizePrepaidExpenses,
            PostAccruals,
            ReconcileIntercompanyTransactions,
            ReconcileInventory,
            TransferNetIncomeToRetainedEarnings,
            PostClosingEntries,
        ]
        .into_iter()
        .filter_map(|task| task.seeding(close_type).map(|required| (task, required)))
        .collect()
    }
}

/// One checklist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseTaskItem {
    pub task: CloseTask,
    pub required: bool,
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CloseTaskItem {
    fn seeded(task: CloseTask, required: bool) -> Self {
        Self {
            task,
            required,
            complete: false,
            completed_at: None,
        }
    }
}

impl ValueObject for CloseTaskItem {}

/// A problem discovered during close validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseValidationIssue {
    pub description: String,
    pub severity: Severity,
    pub resolved: bool,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ValueObject for CloseValidationIssue {}

/// Aggregate root: FiscalPeriodClose.
///
/// The checklist-gated workflow that sequences sub-closing tasks and gates
/// period finalization. `CompleteClose` verifies every precondition with a
/// distinct error so callers can present actionable remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalPeriodClose {
    id: PeriodCloseId,
    close_number: String,
    period_id: PeriodId,
    close_type: CloseType,
    period_start: NaiveDate,
    period_end: NaiveDate,
    initiated_by: String,
    initiated_at: Option<DateTime<Utc>>,
    status: CloseStatus,
    is_complete: bool,
    completed_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    trial_balance_id: Option<TrialBalanceId>,
    trial_balance_generated: bool,
    trial_balance_balanced: bool,
    final_net_income: Option<Decimal>,
    reopen_reason: Option<String>,
    reopened_by: Option<String>,
    reopened_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    tasks: Vec<CloseTaskItem>,
    validation_issues: Vec<CloseValidationIssue>,
    version: u64,
    created: bool,
}

impl FiscalPeriodClose {
    /// Empty aggregate for rehydration.
    pub fn empty(id: PeriodCloseId) -> Self {
        Self {
            id,
            close_number: String::new(),
            period_id: PeriodId::new(AggregateId::from_uuid(uuid::Uuid::nil())),
            close_type: CloseType::MonthEnd,
            period_start: NaiveDate::MIN,
            period_end: NaiveDate::MAX,
            initiated_by: String::new(),
            initiated_at: None,
            status: CloseStatus::InProgress,
            is_complete: false,
            completed_by: None,
            completed_at: None,
            trial_balance_id: None,
            trial_balance_generated: false,
            trial_balance_balanced: false,
            final_net_income: None,
            reopen_reason: None,
            reopened_by: None,
            reopened_at: None,
            notes: None,
            tasks: Vec::new(),
            validation_issues: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PeriodCloseId {
        self.id
    }

    pub fn close_number(&self) -> &str {
        &self.close_number
    }

    pub fn period_id(&self) -> PeriodId {
        self.period_id
    }

    pub fn close_type(&self) -> CloseType {
        self.close_type
    }

    pub fn status(&self) -> CloseStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn tasks(&self) -> &[CloseTaskItem] {
        &self.tasks
    }

    pub fn validation_issues(&self) -> &[CloseValidationIssue] {
        &self.validation_issues
    }

    pub fn task(&self, task: CloseTask) -> Option<&CloseTaskItem> {
        self.tasks.iter().find(|t| t.task == task)
    }

    pub fn is_task_complete(&self, task: CloseTask) -> bool {
        self.task(task).map(|t| t.complete).unwrap_or(false)
    }

    pub fn tasks_completed(&self) -> usize {
        self.tasks.iter().filter(|t| t.complete).count()
    }

    pub fn tasks_remaining(&self) -> usize {
        self.tasks.iter().filter(|t| t.required && !t.complete).count()
    }

    pub fn required_tasks_complete(&self) -> bool {
        self.tasks_remaining() == 0
    }

    pub fn completion_percentage(&self) -> Decimal {
        if self.tasks.is_empty() {
            return Decimal::ZERO;
        }
        Decimal::from(self.tasks_completed() as u64) * Decimal::ONE_HUNDRED
            / Decimal::from(self.tasks.len() as u64)
    }

    pub fn has_unresolved_critical_issues(&self) -> bool {
        self.validation_issues
            .iter()
            .any(|i| !i.resolved && i.severity == Severity::Critical)
    }

    pub fn trial_balance_id(&self) -> Option<TrialBalanceId> {
        self.trial_balance_id
    }

    pub fn trial_balance_generated(&self) -> bool {
        self.trial_balance_generated
    }

    pub fn trial_balance_balanced(&self) -> bool {
        self.trial_balance_balanced
    }

    pub fn final_net_income(&self) -> Option<Decimal> {
        self.final_net_income
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    // Per-flag conveniences over the checklist.

    pub fn all_journals_posted(&self) -> bool {
        self.is_task_complete(CloseTask::PostAllJournalEntries)
    }

    pub fn bank_reconciliations_complete(&self) -> bool {
        self.is_task_complete(CloseTask::CompleteBankReconciliations)
    }

    pub fn ap_reconciliation_complete(&self) -> bool {
        self.is_task_complete(CloseTask::ReconcileApSubsidiaryLedger)
    }

    pub fn ar_reconciliation_complete(&self) -> bool {
        self.is_task_complete(CloseTask::ReconcileArSubsidiaryLedger)
    }

    pub fn depreciation_posted(&self) -> bool {
        self.is_task_complete(CloseTask::PostFixedAssetDepreciation)
    }

    pub fn prepaids_amortized(&self) -> bool {
        self.is_task_complete(CloseTask::AmortizePrepaidExpenses)
    }

    pub fn accruals_posted(&self) -> bool {
        self.is_task_complete(CloseTask::PostAccruals)
    }

    pub fn intercompany_reconciled(&self) -> bool {
        self.is_task_complete(CloseTask::ReconcileIntercompanyTransactions)
    }

    pub fn inventory_reconciled(&self) -> bool {
        self.is_task_complete(CloseTask::ReconcileInventory)
    }

    pub fn net_income_transferred(&self) -> bool {
        self.is_task_complete(CloseTask::TransferNetIncomeToRetainedEarnings)
    }

    pub fn closing_entries_posted(&self) -> bool {
        self.is_task_complete(CloseTask::PostClosingEntries)
    }
}

impl AggregateRoot for FiscalPeriodClose {
    type Id = PeriodCloseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CompleteTask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteCloseTask {
    pub close_id: PeriodCloseId,
    pub task: CloseTask,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InitiateClose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateClose {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub period_id: PeriodId,
    pub close_type: CloseType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub initiated_by: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddValidationIssue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddValidationIssue {
    pub close_id: PeriodCloseId,
    pub description: String,
    pub severity: Severity,
    pub resolution: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveValidationIssue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveValidationIssue {
    pub close_id: PeriodCloseId,
    pub description: String,
    pub resolution: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AttachTrialBalance. Records linkage and auto-completes the
/// trial-balance tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachTrialBalance {
    pub close_id: PeriodCloseId,
    pub trial_balance_id: TrialBalanceId,
    pub is_balanced: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordNetIncome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordNetIncome {
    pub close_id: PeriodCloseId,
    pub net_income: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteClose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteClose {
    pub close_id: PeriodCloseId,
    pub completed_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenClose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenClose {
    pub close_id: PeriodCloseId,
    pub reopened_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodCloseCommand {
    InitiateClose(InitiateClose),
    CompleteTask(CompleteCloseTask),
    AddValidationIssue(AddValidationIssue),
    ResolveValidationIssue(ResolveValidationIssue),
    AttachTrialBalance(AttachTrialBalance),
    RecordNetIncome(RecordNetIncome),
    CompleteClose(CompleteClose),
    ReopenClose(ReopenClose),
}

impl Command for PeriodCloseCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            PeriodCloseCommand::InitiateClose(c) => c.close_id.0,
            PeriodCloseCommand::CompleteTask(c) => c.close_id.0,
            PeriodCloseCommand::AddValidationIssue(c) => c.close_id.0,
            PeriodCloseCommand::ResolveValidationIssue(c) => c.close_id.0,
            PeriodCloseCommand::AttachTrialBalance(c) => c.close_id.0,
            PeriodCloseCommand::RecordNetIncome(c) => c.close_id.0,
            PeriodCloseCommand::CompleteClose(c) => c.close_id.0,
            PeriodCloseCommand::ReopenClose(c) => c.close_id.0,
        }
    }
}

/// Event: CloseInitiated. The standard checklist is derived from
/// `close_type` when the event is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseInitiated {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub period_id: PeriodId,
    pub close_type: CloseType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub initiated_by: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CloseTaskCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseTaskCompleted {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub task: CloseTask,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ValidationIssueFound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssueFound {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub description: String,
    pub severity: Severity,
    pub resolution: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ValidationIssueResolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssueResolved {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub description: String,
    pub resolution: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrialBalanceAttached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceAttached {
    pub close_id: PeriodCloseId,
    pub trial_balance_id: TrialBalanceId,
    pub is_balanced: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NetIncomeRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetIncomeRecorded {
    pub close_id: PeriodCloseId,
    pub net_income: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CloseCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCompleted {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub period_id: PeriodId,
    pub close_type: CloseType,
    pub completed_by: String,
    pub final_net_income: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CloseReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReopened {
    pub close_id: PeriodCloseId,
    pub close_number: String,
    pub period_id: PeriodId,
    pub reopened_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodCloseEvent {
    CloseInitiated(CloseInitiated),
    CloseTaskCompleted(CloseTaskCompleted),
    ValidationIssueFound(ValidationIssueFound),
    ValidationIssueResolved(ValidationIssueResolved),
    TrialBalanceAttached(TrialBalanceAttached),
    NetIncomeRecorded(NetIncomeRecorded),
    CloseCompleted(CloseCompleted),
    CloseReopened(CloseReopened),
}

impl Event for PeriodCloseEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PeriodCloseEvent::CloseInitiated(_) => "close.fiscal_period.initiated",
            PeriodCloseEvent::CloseTaskCompleted(_) => "close.fiscal_period.task_completed",
            PeriodCloseEvent::ValidationIssueFound(_) => {
                "close.fiscal_period.validation_issue_found"
            }
            PeriodCloseEvent::ValidationIssueResolved(_) => {
                "close.fiscal_period.validation_issue_resolved"
            }
            PeriodCloseEvent::TrialBalanceAttached(_) => {
                "close.fiscal_period.trial_balance_attached"
            }
            PeriodCloseEvent::NetIncomeRecorded(_) => "close.fiscal_period.net_income_recorded",
            PeriodCloseEvent::CloseCompleted(_) => "close.fiscal_period.completed",
            PeriodCloseEvent::CloseReopened(_) => "close.fiscal_period.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PeriodCloseEvent::CloseInitiated(e) => e.occurred_at,
            PeriodCloseEvent::CloseTaskCompleted(e) => e.occurred_at,
            PeriodCloseEvent::ValidationIssueFound(e) => e.occurred_at,
            PeriodCloseEvent::ValidationIssueResolved(e) => e.occurred_at,
            PeriodCloseEvent::TrialBalanceAttached(e) => e.occurred_at,
            PeriodCloseEvent::NetIncomeRecorded(e) => e.occurred_at,
            PeriodCloseEvent::CloseCompleted(e) => e.occurred_at,
            PeriodCloseEvent::CloseReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FiscalPeriodClose {
    type Command = PeriodCloseCommand;
    type Event = PeriodCloseEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PeriodCloseEvent::CloseInitiated(e) => {
                self.id = e.close_id;
                self.close_number = e.close_number.clone();
                self.period_id = e.period_id;
                self.close_type = e.close_type;
                self.period_start = e.period_start;
                self.period_end = e.period_end;
                self.initiated_by = e.initiated_by.clone();
                self.initiated_at = Some(e.occurred_at);
                self.status = CloseStatus::InProgress;
                self.is_complete = false;
                self.notes = e.notes.clone();
                self.tasks = CloseTask::standard_tasks(e.close_type)
                    .into_iter()
                    .map(|(task, required)| CloseTaskItem::seeded(task, required))
                    .collect();
                self.validation_issues.clear();
                self.created = true;
            }
            PeriodCloseEvent::CloseTaskCompleted(e) => {
                if let Some(item) = self.tasks.iter_mut().find(|t| t.task == e.task) {
                    item.complete = true;
                    item.completed_at = Some(e.occurred_at);
                }
            }
            PeriodCloseEvent::ValidationIssueFound(e) => {
                let resolved = e.resolution.is_some();
                self.validation_issues.push(CloseValidationIssue {
                    description: e.description.clone(),
                    severity: e.severity,
                    resolved,
                    resolution: e.resolution.clone(),
                    resolved_at: resolved.then_some(e.occurred_at),
                });
            }
            PeriodCloseEvent::ValidationIssueResolved(e) => {
                if let Some(issue) = self
                    .validation_issues
                    .iter_mut()
                    .find(|i| i.description == e.description && !i.resolved)
                {
                    issue.resolved = true;
                    issue.resolution = Some(e.resolution.clone());
                    issue.resolved_at = Some(e.occurred_at);
                }
            }
            PeriodCloseEvent::TrialBalanceAttached(e) => {
                self.trial_balance_id = Some(e.trial_balance_id);
                self.trial_balance_generated = true;
                self.trial_balance_balanced = e.is_balanced;
            }
            PeriodCloseEvent::NetIncomeRecorded(e) => {
                self.final_net_income = Some(e.net_income);
            }
            PeriodCloseEvent::CloseCompleted(e) => {
                self.status = CloseStatus::Completed;
                self.is_complete = true;
                self.completed_by = Some(e.completed_by.clone());
                self.completed_at = Some(e.occurred_at);
            }
            PeriodCloseEvent::CloseReopened(e) => {
                self.status = CloseStatus::Reopened;
                self.is_complete = false;
                self.completed_by = None;
                self.completed_at = None;
                self.reopen_reason = Some(e.reason.clone());
                self.reopened_by = Some(e.reopened_by.clone());
                self.reopened_at = Some(e.occurred_at);
                let appended = match self.notes.take() {
                    Some(notes) => format!("{notes}\n\nReopened: {}", e.reason),
                    None => format!("Reopened: {}", e.reason),
                };
                self.notes = Some(appended);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PeriodCloseCommand::InitiateClose(cmd) => self.handle_initiate(cmd),
            PeriodCloseCommand::CompleteTask(cmd) => self.handle_complete_task(cmd),
            PeriodCloseCommand::AddValidationIssue(cmd) => self.handle_add_issue(cmd),
            PeriodCloseCommand::ResolveValidationIssue(cmd) => self.handle_resolve_issue(cmd),
            PeriodCloseCommand::AttachTrialBalance(cmd) => self.handle_attach_trial_balance(cmd),
            PeriodCloseCommand::RecordNetIncome(cmd) => self.handle_record_net_income(cmd),
            PeriodCloseCommand::CompleteClose(cmd) => self.handle_complete(cmd),
            PeriodCloseCommand::ReopenClose(cmd) => self.handle_reopen(cmd),
        }
    }
}

impl FiscalPeriodClose {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_not_completed(&self) -> Result<(), DomainError> {
        if self.status == CloseStatus::Completed {
            return Err(DomainError::conflict("cannot modify a completed period close"));
        }
        Ok(())
    }

    fn task_completion(
        &self,
        task: CloseTask,
        occurred_at: DateTime<Utc>,
    ) -> Result<Option<PeriodCloseEvent>, DomainError> {
        let item = self.task(task).ok_or_else(|| {
            DomainError::validation(format!(
                "task '{}' is not part of this close",
                task.label()
            ))
        })?;

        // Completing an already-complete task is a no-op.
        if item.complete {
            return Ok(None);
        }

        Ok(Some(PeriodCloseEvent::CloseTaskCompleted(
            CloseTaskCompleted {
                close_id: self.id,
                close_number: self.close_number.clone(),
                task,
                occurred_at,
            },
        )))
    }

    fn handle_initiate(&self, cmd: &InitiateClose) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("period close already exists"));
        }
        if cmd.close_number.trim().is_empty() {
            return Err(DomainError::validation("close number is required"));
        }
        if cmd.initiated_by.trim().is_empty() {
            return Err(DomainError::validation("initiator is required"));
        }
        if cmd.period_start >= cmd.period_end {
            return Err(DomainError::validation(
                "period start date must be before end date",
            ));
        }

        Ok(vec![PeriodCloseEvent::CloseInitiated(CloseInitiated {
            close_id: cmd.close_id,
            close_number: cmd.close_number.trim().to_string(),
            period_id: cmd.period_id,
            close_type: cmd.close_type,
            period_start: cmd.period_start,
            period_end: cmd.period_end,
            initiated_by: cmd.initiated_by.trim().to_string(),
            notes: cmd
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete_task(
        &self,
        cmd: &CompleteCloseTask,
    ) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_completed()?;

        Ok(self
            .task_completion(cmd.task, cmd.occurred_at)?
            .into_iter()
            .collect())
    }

    fn handle_add_issue(
        &self,
        cmd: &AddValidationIssue,
    ) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_completed()?;
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("issue description is required"));
        }

        Ok(vec![PeriodCloseEvent::ValidationIssueFound(
            ValidationIssueFound {
                close_id: cmd.close_id,
                close_number: self.close_number.clone(),
                description: cmd.description.trim().to_string(),
                severity: cmd.severity,
                resolution: cmd
                    .resolution
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_resolve_issue(
        &self,
        cmd: &ResolveValidationIssue,
    ) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.resolution.trim().is_empty() {
            return Err(DomainError::validation("resolution is required"));
        }

        let description = cmd.description.trim();
        if !self
            .validation_issues
            .iter()
            .any(|i| i.description == description && !i.resolved)
        {
            return Err(DomainError::validation(format!(
                "unresolved issue '{description}' not found"
            )));
        }

        Ok(vec![PeriodCloseEvent::ValidationIssueResolved(
            ValidationIssueResolved {
                close_id: cmd.close_id,
                close_number: self.close_number.clone(),
                description: description.to_string(),
                resolution: cmd.resolution.trim().to_string(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_attach_trial_balance(
        &self,
        cmd: &AttachTrialBalance,
    ) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_completed()?;

        let mut events = vec![PeriodCloseEvent::TrialBalanceAttached(TrialBalanceAttached {
            close_id: cmd.close_id,
            trial_balance_id: cmd.trial_balance_id,
            is_balanced: cmd.is_balanced,
            occurred_at: cmd.occurred_at,
        })];

        events.extend(self.task_completion(CloseTask::GenerateTrialBalance, cmd.occurred_at)?);
        if cmd.is_balanced {
            events.extend(
                self.task_completion(CloseTask::VerifyTrialBalanceBalanced, cmd.occurred_at)?,
            );
        }

        Ok(events)
    }

    fn handle_record_net_income(
        &self,
        cmd: &RecordNetIncome,
    ) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_completed()?;

        Ok(vec![PeriodCloseEvent::NetIncomeRecorded(NetIncomeRecorded {
            close_id: cmd.close_id,
            net_income: cmd.net_income,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteClose) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.completed_by.trim().is_empty() {
            return Err(DomainError::validation("completer information is required"));
        }
        if self.status == CloseStatus::Completed {
            return Err(DomainError::conflict("period close is already completed"));
        }
        if !self.required_tasks_complete() {
            return Err(DomainError::conflict(format!(
                "cannot complete period close with {} required tasks remaining",
                self.tasks_remaining()
            )));
        }
        if !self.trial_balance_balanced {
            return Err(DomainError::invariant(
                "cannot complete period close with unbalanced trial balance",
            ));
        }
        if self.has_unresolved_critical_issues() {
            return Err(DomainError::invariant(
                "cannot complete period close with unresolved critical validation issues",
            ));
        }
        if self.close_type == CloseType::YearEnd && !self.net_income_transferred() {
            return Err(DomainError::conflict(
                "cannot complete year-end close without transferring net income",
            ));
        }

        Ok(vec![PeriodCloseEvent::CloseCompleted(CloseCompleted {
            close_id: cmd.close_id,
            close_number: self.close_number.clone(),
            period_id: self.period_id,
            close_type: self.close_type,
            completed_by: cmd.completed_by.trim().to_string(),
            final_net_income: self.final_net_income,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenClose) -> Result<Vec<PeriodCloseEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.reopened_by.trim().is_empty() {
            return Err(DomainError::validation("reopener information is required"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reopen reason is required"));
        }
        if self.status != CloseStatus::Completed {
            return Err(DomainError::conflict(
                "can only reopen a completed period close",
            ));
        }

        Ok(vec![PeriodCloseEvent::CloseReopened(CloseReopened {
            close_id: cmd.close_id,
            close_number: self.close_number.clone(),
            period_id: self.period_id,
            reopened_by: cmd.reopened_by.trim().to_string(),
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
