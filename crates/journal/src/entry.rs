use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{
    AccountId, Aggregate, AggregateId, AggregateRoot, DomainError, UserId, ValueObject,
};
use ledgerkit_events::{Command, Event};
use ledgerkit_period::PeriodId;

/// Rounding tolerance for entry-level balance checks.
///
/// Note: this applies to individual journal entries only. Batch posting uses
/// strict equality, a deliberately stricter rule.
pub const BALANCE_TOLERANCE: Decimal = dec!(0.01);

const MAX_MEMO_LEN: usize = 512;
const MAX_REFERENCE_LEN: usize = 64;

/// Journal entry identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JournalEntryId(pub AggregateId);

impl JournalEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for JournalEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Approval sub-state, orthogonal to posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// One side of a journal entry: a debit-or-credit assertion against one
/// account. Immutable once the parent entry is posted.
///
/// Invariant: exactly one of `debit`/`credit` is positive, neither negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    account_id: AccountId,
    debit: Decimal,
    credit: Decimal,
    memo: Option<String>,
    reference: Option<String>,
}

impl JournalEntryLine {
    pub fn new(
        account_id: AccountId,
        debit: Decimal,
        credit: Decimal,
        memo: Option<String>,
        reference: Option<String>,
    ) -> Result<Self, DomainError> {
        if debit < Decimal::ZERO || credit < Decimal::ZERO {
            return Err(DomainError::validation("line amounts cannot be negative"));
        }
        if debit > Decimal::ZERO && credit > Decimal::ZERO {
            return Err(DomainError::validation(
                "line cannot carry both a debit and a credit",
            ));
        }
        if debit == Decimal::ZERO && credit == Decimal::ZERO {
            return Err(DomainError::validation(
                "line must carry either a debit or a credit",
            ));
        }

        let memo = trim_capped(memo, MAX_MEMO_LEN, "memo")?;
        let reference = trim_capped(reference, MAX_REFERENCE_LEN, "reference")?;

        Ok(Self {
            account_id,
            debit,
            credit,
            memo,
            reference,
        })
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn debit(&self) -> Decimal {
        self.debit
    }

    pub fn credit(&self) -> Decimal {
        self.credit
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn is_debit(&self) -> bool {
        self.debit > Decimal::ZERO
    }
}

impl ValueObject for JournalEntryLine {}

fn trim_capped(
    value: Option<String>,
    max: usize,
    field: &str,
) -> Result<Option<String>, DomainError> {
    match value {
        None => Ok(None),
        Some(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if s.len() > max {
                return Err(DomainError::validation(format!(
                    "{field} cannot exceed {max} characters"
                )));
            }
            Ok(Some(s.to_string()))
        }
    }
}

/// Aggregate root: JournalEntry.
///
/// A balanced double-entry transaction. Balance is validated explicitly
/// (`validate_balance`), not on every `AddLine`. Posting is one-way: once
/// posted the entry is immutable, and the only permitted operation is
/// `ReverseEntry`, which emits a reversal signal without mutating balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    id: JournalEntryId,
    date: NaiveDate,
    reference_number: String,
    description: String,
    source: String,
    period_id: Option<PeriodId>,
    /// Control amount for reference; not used for balancing.
    original_amount: Decimal,
    is_posted: bool,
    approval: ApprovalStatus,
    approved_by: Option<UserId>,
    approver_name: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    lines: Vec<JournalEntryLine>,
    version: u64,
    created: bool,
}

impl JournalEntry {
    /// Empty aggregate for rehydration.
    pub fn empty(id: JournalEntryId) -> Self {
        Self {
            id,
            date: NaiveDate::MIN,
            reference_number: String::new(),
            description: String::new(),
            source: String::new(),
            period_id: None,
            original_amount: Decimal::ZERO,
            is_posted: false,
            approval: ApprovalStatus::Pending,
            approved_by: None,
            approver_name: None,
            approved_at: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> JournalEntryId {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn reference_number(&self) -> &str {
        &self.reference_number
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn period_id(&self) -> Option<PeriodId> {
        self.period_id
    }

    pub fn original_amount(&self) -> Decimal {
        self.original_amount
    }

    pub fn is_posted(&self) -> bool {
        self.is_posted
    }

    pub fn approval(&self) -> ApprovalStatus {
        self.approval
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn lines(&self) -> &[JournalEntryLine] {
        &self.lines
    }

    /// Sum of all debit amounts.
    pub fn total_debits(&self) -> Decimal {
        self.lines.iter().map(|l| l.debit).sum()
    }

    /// Sum of all credit amounts.
    pub fn total_credits(&self) -> Decimal {
        self.lines.iter().map(|l| l.credit).sum()
    }

    /// Debits minus credits.
    pub fn difference(&self) -> Decimal {
        self.total_debits() - self.total_credits()
    }

    /// Whether `|difference| < tolerance`.
    pub fn is_balanced_within(&self, tolerance: Decimal) -> bool {
        self.difference().abs() < tolerance
    }

    /// Whether the entry balances within the standard 0.01 tolerance.
    pub fn is_balanced(&self) -> bool {
        self.is_balanced_within(BALANCE_TOLERANCE)
    }

    /// Fails with a specific "not balanced" error when unbalanced.
    ///
    /// Callers (the batch posting orchestrator) must invoke this before
    /// posting.
    pub fn validate_balance(&self) -> Result<(), DomainError> {
        if !self.is_balanced() {
            return Err(DomainError::invariant(format!(
                "journal entry {} is not balanced (difference: {})",
                self.id,
                self.difference()
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for JournalEntry {
    type Id = JournalEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntry {
    pub entry_id: JournalEntryId,
    pub date: NaiveDate,
    pub reference_number: String,
    pub description: String,
    pub source: String,
    pub period_id: Option<PeriodId>,
    pub original_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateEntry. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    pub entry_id: JournalEntryId,
    pub date: Option<NaiveDate>,
    pub reference_number: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub period_id: Option<PeriodId>,
    pub original_amount: Option<Decimal>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntry {
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntry {
    pub entry_id: JournalEntryId,
    pub reversal_date: NaiveDate,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveEntry {
    pub entry_id: JournalEntryId,
    pub approver_id: UserId,
    pub approver_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectEntry {
    pub entry_id: JournalEntryId,
    pub rejected_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntryCommand {
    CreateEntry(CreateEntry),
    UpdateEntry(UpdateEntry),
    AddLine(AddLine),
    PostEntry(PostEntry),
    ReverseEntry(ReverseEntry),
    ApproveEntry(ApproveEntry),
    RejectEntry(RejectEntry),
}

impl Command for JournalEntryCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            JournalEntryCommand::CreateEntry(c) => c.entry_id.0,
            JournalEntryCommand::UpdateEntry(c) => c.entry_id.0,
            JournalEntryCommand::AddLine(c) => c.entry_id.0,
            JournalEntryCommand::PostEntry(c) => c.entry_id.0,
            JournalEntryCommand::ReverseEntry(c) => c.entry_id.0,
            JournalEntryCommand::ApproveEntry(c) => c.entry_id.0,
            JournalEntryCommand::RejectEntry(c) => c.entry_id.0,
        }
    }
}

/// Event: EntryCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCreated {
    pub entry_id: JournalEntryId,
    pub date: NaiveDate,
    pub reference_number: String,
    pub description: String,
    pub source: String,
    pub period_id: Option<PeriodId>,
    pub original_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryUpdated. Carries the merged field values after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUpdated {
    pub entry_id: JournalEntryId,
    pub date: NaiveDate,
    pub reference_number: String,
    pub description: String,
    pub source: String,
    pub period_id: Option<PeriodId>,
    pub original_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub entry_id: JournalEntryId,
    pub line: JournalEntryLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub entry_id: JournalEntryId,
    pub date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryReversed.
///
/// A reversal signal only: the posted entry stays posted and its lines stay
/// untouched. Creation of the offsetting entry belongs to a higher-level
/// workflow consuming this event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReversed {
    pub entry_id: JournalEntryId,
    pub reversal_date: NaiveDate,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryApproved {
    pub entry_id: JournalEntryId,
    pub approver_id: UserId,
    pub approver_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EntryRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRejected {
    pub entry_id: JournalEntryId,
    pub rejected_by: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntryEvent {
    EntryCreated(EntryCreated),
    EntryUpdated(EntryUpdated),
    LineAdded(LineAdded),
    EntryPosted(EntryPosted),
    EntryReversed(EntryReversed),
    EntryApproved(EntryApproved),
    EntryRejected(EntryRejected),
}

impl Event for JournalEntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEntryEvent::EntryCreated(_) => "journal.entry.created",
            JournalEntryEvent::EntryUpdated(_) => "journal.entry.updated",
            JournalEntryEvent::LineAdded(_) => "journal.entry.line_added",
            JournalEntryEvent::EntryPosted(_) => "journal.entry.posted",
            JournalEntryEvent::EntryReversed(_) => "journal.entry.reversed",
            JournalEntryEvent::EntryApproved(_) => "journal.entry.approved",
            JournalEntryEvent::EntryRejected(_) => "journal.entry.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEntryEvent::EntryCreated(e) => e.occurred_at,
            JournalEntryEvent::EntryUpdated(e) => e.occurred_at,
            JournalEntryEvent::LineAdded(e) => e.occurred_at,
            JournalEntryEvent::EntryPosted(e) => e.occurred_at,
            JournalEntryEvent::EntryReversed(e) => e.occurred_at,
            JournalEntryEvent::EntryApproved(e) => e.occurred_at,
            JournalEntryEvent::EntryRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalEntryCommand;
    type Event = JournalEntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEntryEvent::EntryCreated(e) => {
                self.id = e.entry_id;
                self.date = e.date;
                self.reference_number = e.reference_number.clone();
                self.description = e.description.clone();
                self.source = e.source.clone();
                self.period_id = e.period_id;
                self.original_amount = e.original_amount;
                self.is_posted = false;
                self.approval = ApprovalStatus::Pending;
                self.lines.clear();
                self.created = true;
            }
            JournalEntryEvent::EntryUpdated(e) => {
                self.date = e.date;
                self.reference_number = e.reference_number.clone();
                self.description = e.description.clone();
                self.source = e.source.clone();
                self.period_id = e.period_id;
                self.original_amount = e.original_amount;
            }
            JournalEntryEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            JournalEntryEvent::EntryPosted(_) => {
                self.is_posted = true;
            }
            // A reversal is a signal, not a mutation: the entry stays posted.
            JournalEntryEvent::EntryReversed(_) => {}
            JournalEntryEvent::EntryApproved(e) => {
                self.approval = ApprovalStatus::Approved;
                self.approved_by = Some(e.approver_id);
                self.approver_name = e.approver_name.clone();
                self.approved_at = Some(e.occurred_at);
            }
            JournalEntryEvent::EntryRejected(e) => {
                self.approval = ApprovalStatus::Rejected;
                self.approved_by = None;
                self.approver_name = Some(e.rejected_by.clone());
                self.approved_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalEntryCommand::CreateEntry(cmd) => self.handle_create(cmd),
            JournalEntryCommand::UpdateEntry(cmd) => self.handle_update(cmd),
            JournalEntryCommand::AddLine(cmd) => self.handle_add_line(cmd),
            JournalEntryCommand::PostEntry(cmd) => self.handle_post(cmd),
            JournalEntryCommand::ReverseEntry(cmd) => self.handle_reverse(cmd),
            JournalEntryCommand::ApproveEntry(cmd) => self.handle_approve(cmd),
            JournalEntryCommand::RejectEntry(cmd) => self.handle_reject(cmd),
        }
    }
}

impl JournalEntry {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_not_posted(&self) -> Result<(), DomainError> {
        if self.is_posted {
            return Err(DomainError::conflict(
                "journal entry cannot be modified once posted",
            ));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("journal entry already exists"));
        }

        Ok(vec![JournalEntryEvent::EntryCreated(EntryCreated {
            entry_id: cmd.entry_id,
            date: cmd.date,
            reference_number: cmd.reference_number.trim().to_string(),
            description: cmd.description.trim().to_string(),
            source: cmd.source.trim().to_string(),
            period_id: cmd.period_id,
            original_amount: cmd.original_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_posted()?;

        let date = cmd.date.unwrap_or(self.date);
        let reference_number = match &cmd.reference_number {
            Some(r) if !r.trim().is_empty() => r.trim().to_string(),
            _ => self.reference_number.clone(),
        };
        let description = match &cmd.description {
            Some(d) if !d.trim().is_empty() => d.trim().to_string(),
            _ => self.description.clone(),
        };
        let source = match &cmd.source {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => self.source.clone(),
        };
        let period_id = cmd.period_id.or(self.period_id);
        let original_amount = cmd.original_amount.unwrap_or(self.original_amount);

        // No-change updates emit nothing.
        if date == self.date
            && reference_number == self.reference_number
            && description == self.description
            && source == self.source
            && period_id == self.period_id
            && original_amount == self.original_amount
        {
            return Ok(vec![]);
        }

        Ok(vec![JournalEntryEvent::EntryUpdated(EntryUpdated {
            entry_id: cmd.entry_id,
            date,
            reference_number,
            description,
            source,
            period_id,
            original_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_not_posted()?;

        let line = JournalEntryLine::new(
            cmd.account_id,
            cmd.debit,
            cmd.credit,
            cmd.memo.clone(),
            cmd.reference.clone(),
        )?;

        Ok(vec![JournalEntryEvent::LineAdded(LineAdded {
            entry_id: cmd.entry_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        if self.is_posted {
            return Err(DomainError::conflict("journal entry is already posted"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("journal entry must have lines"));
        }
        self.validate_balance()?;

        Ok(vec![JournalEntryEvent::EntryPosted(EntryPosted {
            entry_id: cmd.entry_id,
            date: self.date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        if !self.is_posted {
            return Err(DomainError::conflict(
                "only posted journal entries can be reversed",
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reversal reason is required"));
        }

        Ok(vec![JournalEntryEvent::EntryReversed(EntryReversed {
            entry_id: cmd.entry_id,
            reversal_date: cmd.reversal_date,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        if self.approval == ApprovalStatus::Approved {
            return Err(DomainError::conflict("journal entry already approved"));
        }

        Ok(vec![JournalEntryEvent::EntryApproved(EntryApproved {
            entry_id: cmd.entry_id,
            approver_id: cmd.approver_id,
            approver_name: cmd.approver_name.as_deref().map(|n| n.trim().to_string()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_created()?;
        if self.approval == ApprovalStatus::Rejected {
            return Err(DomainError::conflict("journal entry already rejected"));
        }

        Ok(vec![JournalEntryEvent::EntryRejected(EntryRejected {
            entry_id: cmd.entry_id,
            rejected_by: cmd.rejected_by.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkit_events::execute;
    use proptest::prelude::*;

    fn test_entry_id() -> JournalEntryId {
        JournalEntryId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 19).unwrap()
    }

    fn created_entry(id: JournalEntryId) -> JournalEntry {
        let mut entry = JournalEntry::empty(id);
        execute(
            &mut entry,
            &JournalEntryCommand::CreateEntry(CreateEntry {
                entry_id: id,
                date: test_date(),
                reference_number: "INV-2025-001".to_string(),
                description: "Test entry".to_string(),
                source: "ManualEntry".to_string(),
                period_id: None,
                original_amount: Decimal::ZERO,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        entry
    }

    fn add_line(entry: &mut JournalEntry, debit: Decimal, credit: Decimal) {
        let id = entry.id_typed();
        execute(
            entry,
            &JournalEntryCommand::AddLine(AddLine {
                entry_id: id,
                account_id: AccountId::new(),
                debit,
                credit,
                memo: None,
                reference: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn line_requires_exactly_one_side() {
        let account = AccountId::new();

        let err =
            JournalEntryLine::new(account, dec!(100), dec!(100), None, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = JournalEntryLine::new(account, Decimal::ZERO, Decimal::ZERO, None, None)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = JournalEntryLine::new(account, dec!(-5), Decimal::ZERO, None, None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let line = JournalEntryLine::new(account, dec!(100), Decimal::ZERO, None, None).unwrap();
        assert!(line.is_debit());
    }

    #[test]
    fn balanced_entry_posts_once() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        add_line(&mut entry, dec!(1000), Decimal::ZERO);
        add_line(&mut entry, Decimal::ZERO, dec!(1000));

        assert!(entry.is_balanced());

        let post = JournalEntryCommand::PostEntry(PostEntry {
            entry_id: id,
            occurred_at: test_time(),
        });
        let events = execute(&mut entry, &post).unwrap();
        assert_eq!(events.len(), 1);
        assert!(entry.is_posted());

        // Second post fails with a state-conflict error.
        let err = entry.handle(&post).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn unbalanced_entry_cannot_post() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        add_line(&mut entry, dec!(100), Decimal::ZERO);
        add_line(&mut entry, Decimal::ZERO, dec!(90));

        assert!(!entry.is_balanced());
        assert!(matches!(
            entry.validate_balance().unwrap_err(),
            DomainError::InvariantViolation(_)
        ));

        let err = entry
            .handle(&JournalEntryCommand::PostEntry(PostEntry {
                entry_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(!entry.is_posted());
    }

    #[test]
    fn penny_difference_stays_within_tolerance() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        add_line(&mut entry, dec!(100.004), Decimal::ZERO);
        add_line(&mut entry, Decimal::ZERO, dec!(100.00));

        assert!(entry.is_balanced());
        assert!(!entry.is_balanced_within(dec!(0.001)));
    }

    #[test]
    fn posted_entry_is_immutable() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        add_line(&mut entry, dec!(500), Decimal::ZERO);
        add_line(&mut entry, Decimal::ZERO, dec!(500));
        execute(
            &mut entry,
            &JournalEntryCommand::PostEntry(PostEntry {
                entry_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = entry
            .handle(&JournalEntryCommand::AddLine(AddLine {
                entry_id: id,
                account_id: AccountId::new(),
                debit: dec!(1),
                credit: Decimal::ZERO,
                memo: None,
                reference: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let err = entry
            .handle(&JournalEntryCommand::UpdateEntry(UpdateEntry {
                entry_id: id,
                date: None,
                reference_number: Some("INV-2025-002".to_string()),
                description: None,
                source: None,
                period_id: None,
                original_amount: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reverse_requires_posted_and_leaves_entry_posted() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        add_line(&mut entry, dec!(250), Decimal::ZERO);
        add_line(&mut entry, Decimal::ZERO, dec!(250));

        let reverse = JournalEntryCommand::ReverseEntry(ReverseEntry {
            entry_id: id,
            reversal_date: test_date(),
            reason: "posted in error".to_string(),
            occurred_at: test_time(),
        });

        // Not yet posted: reversal is rejected.
        let err = entry.handle(&reverse).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        execute(
            &mut entry,
            &JournalEntryCommand::PostEntry(PostEntry {
                entry_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let events = execute(&mut entry, &reverse).unwrap();
        assert!(matches!(
            events[0],
            JournalEntryEvent::EntryReversed(ref e) if e.reason == "posted in error"
        ));
        // The reversal is a signal only; the entry stays posted and intact.
        assert!(entry.is_posted());
        assert_eq!(entry.total_debits(), dec!(250));
    }

    #[test]
    fn approval_is_orthogonal_and_idempotency_guarded() {
        let id = test_entry_id();
        let mut entry = created_entry(id);
        assert_eq!(entry.approval(), ApprovalStatus::Pending);

        let approve = JournalEntryCommand::ApproveEntry(ApproveEntry {
            entry_id: id,
            approver_id: UserId::new(),
            approver_name: Some("Controller".to_string()),
            occurred_at: test_time(),
        });
        execute(&mut entry, &approve).unwrap();
        assert_eq!(entry.approval(), ApprovalStatus::Approved);
        assert!(!entry.is_posted());

        let err = entry.handle(&approve).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reject_records_reviewer() {
        let id = test_entry_id();
        let mut entry = created_entry(id);

        let reject = JournalEntryCommand::RejectEntry(RejectEntry {
            entry_id: id,
            rejected_by: "auditor".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut entry, &reject).unwrap();
        assert_eq!(entry.approval(), ApprovalStatus::Rejected);

        let err = entry.handle(&reject).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: total_debits - total_credits == difference for any mix
        /// of one-sided lines.
        #[test]
        fn difference_identity_holds(
            sides in prop::collection::vec((1i64..1_000_000i64, prop::bool::ANY), 1..12)
        ) {
            let id = test_entry_id();
            let mut entry = created_entry(id);

            for (cents, is_debit) in sides {
                let amount = Decimal::new(cents, 2);
                let (debit, credit) = if is_debit {
                    (amount, Decimal::ZERO)
                } else {
                    (Decimal::ZERO, amount)
                };
                add_line(&mut entry, debit, credit);
            }

            prop_assert_eq!(entry.total_debits() - entry.total_credits(), entry.difference());
        }

        /// Property: posting fails whenever the difference reaches the
        /// tolerance.
        #[test]
        fn post_rejects_out_of_tolerance_entries(debit_cents in 1i64..1_000_000i64, skew_cents in 1i64..10_000i64) {
            let id = test_entry_id();
            let mut entry = created_entry(id);
            add_line(&mut entry, Decimal::new(debit_cents, 2), Decimal::ZERO);
            add_line(&mut entry, Decimal::ZERO, Decimal::new(debit_cents + skew_cents, 2));

            let result = entry.handle(&JournalEntryCommand::PostEntry(PostEntry {
                entry_id: id,
                occurred_at: test_time(),
            }));
            prop_assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
        }
    }
}
