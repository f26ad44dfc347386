use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId, ValueObject};
use ledgerkit_events::{Command, Event};
use ledgerkit_period::PeriodId;

use crate::entry::{JournalEntry, JournalEntryId};

/// Posting batch identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingBatchId(pub AggregateId);

impl PostingBatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PostingBatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Batch status lifecycle.
///
/// Pending → Approved → Posted → Reversed, or Pending → Rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Approved,
    Posted,
    Reversed,
    Rejected,
}

/// Non-owning member summary: the batch references journal entries by id and
/// caches their totals for batch-level balance checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMember {
    pub entry_id: JournalEntryId,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
}

impl BatchMember {
    /// Snapshot the current totals of a live entry.
    pub fn summarize(entry: &JournalEntry) -> Self {
        Self {
            entry_id: entry.id_typed(),
            total_debits: entry.total_debits(),
            total_credits: entry.total_credits(),
        }
    }
}

impl ValueObject for BatchMember {}

/// Aggregate root: PostingBatch.
///
/// Groups journal entries for bulk approval, posting and reversal. Totals are
/// recomputed from the member summaries on every membership change and again
/// from the live entries at post time. Batch posting requires **exact**
/// debit/credit equality with no tolerance, a deliberately stricter rule
/// than the entry-level check.
///
/// The batch itself never drives member entries; `BatchPosted` and
/// `BatchReversed` carry the member entry ids and the posting orchestrator
/// sequences the per-entry commands two-phase (validate everything, then
/// commit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingBatch {
    id: PostingBatchId,
    batch_number: String,
    batch_date: NaiveDate,
    description: Option<String>,
    period_id: Option<PeriodId>,
    status: BatchStatus,
    members: Vec<BatchMember>,
    total_debits: Decimal,
    total_credits: Decimal,
    approved_by: Option<UserId>,
    approver_name: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    posted_by: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    reversed_by: Option<String>,
    reversed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PostingBatch {
    /// Empty aggregate for rehydration.
    pub fn empty(id: PostingBatchId) -> Self {
        Self {
            id,
            batch_number: String::new(),
            batch_date: NaiveDate::MIN,
            description: None,
            period_id: None,
            status: BatchStatus::Pending,
            members: Vec::new(),
            total_debits: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            approved_by: None,
            approver_name: None,
            approved_at: None,
            posted_by: None,
            posted_at: None,
            reversed_by: None,
            reversed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PostingBatchId {
        self.id
    }

    pub fn batch_number(&self) -> &str {
        &self.batch_number
    }

    pub fn batch_date(&self) -> NaiveDate {
        self.batch_date
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn period_id(&self) -> Option<PeriodId> {
        self.period_id
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn members(&self) -> &[BatchMember] {
        &self.members
    }

    pub fn entry_ids(&self) -> Vec<JournalEntryId> {
        self.members.iter().map(|m| m.entry_id).collect()
    }

    pub fn entry_count(&self) -> usize {
        self.members.len()
    }

    pub fn total_debits(&self) -> Decimal {
        self.total_debits
    }

    pub fn total_credits(&self) -> Decimal {
        self.total_credits
    }

    pub fn posted_by(&self) -> Option<&str> {
        self.posted_by.as_deref()
    }

    pub fn reversed_by(&self) -> Option<&str> {
        self.reversed_by.as_deref()
    }

    fn recalculate_totals(&mut self) {
        self.total_debits = self.members.iter().map(|m| m.total_debits).sum();
        self.total_credits = self.members.iter().map(|m| m.total_credits).sum();
    }
}

impl AggregateRoot for PostingBatch {
    type Id = PostingBatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub description: Option<String>,
    pub period_id: Option<PeriodId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddEntry. Only valid while the batch is Pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntry {
    pub batch_id: PostingBatchId,
    pub member: BatchMember,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveBatch {
    pub batch_id: PostingBatchId,
    pub approver_id: UserId,
    pub approver_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectBatch {
    pub batch_id: PostingBatchId,
    pub rejected_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostBatch.
///
/// `members` carries fresh summaries of the live entries, read by the
/// orchestrator immediately before posting; the handler recomputes totals
/// from them rather than trusting the cached ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostBatch {
    pub batch_id: PostingBatchId,
    pub posted_by: String,
    pub members: Vec<BatchMember>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReverseBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseBatch {
    pub batch_id: PostingBatchId,
    pub reversed_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingBatchCommand {
    CreateBatch(CreateBatch),
    AddEntry(AddEntry),
    ApproveBatch(ApproveBatch),
    RejectBatch(RejectBatch),
    PostBatch(PostBatch),
    ReverseBatch(ReverseBatch),
}

impl Command for PostingBatchCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            PostingBatchCommand::CreateBatch(c) => c.batch_id.0,
            PostingBatchCommand::AddEntry(c) => c.batch_id.0,
            PostingBatchCommand::ApproveBatch(c) => c.batch_id.0,
            PostingBatchCommand::RejectBatch(c) => c.batch_id.0,
            PostingBatchCommand::PostBatch(c) => c.batch_id.0,
            PostingBatchCommand::ReverseBatch(c) => c.batch_id.0,
        }
    }
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub description: Option<String>,
    pub period_id: Option<PeriodId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchEntryAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntryAdded {
    pub batch_id: PostingBatchId,
    pub member: BatchMember,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchApproved {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub approver_id: UserId,
    pub approver_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRejected {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub rejected_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchPosted. Carries the refreshed member summaries and ids so
/// downstream consumers (and the orchestrator) know exactly what was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPosted {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub batch_date: NaiveDate,
    pub members: Vec<BatchMember>,
    pub posted_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReversed {
    pub batch_id: PostingBatchId,
    pub batch_number: String,
    pub entry_ids: Vec<JournalEntryId>,
    pub reversed_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostingBatchEvent {
    BatchCreated(BatchCreated),
    BatchEntryAdded(BatchEntryAdded),
    BatchApproved(BatchApproved),
    BatchRejected(BatchRejected),
    BatchPosted(BatchPosted),
    BatchReversed(BatchReversed),
}

impl Event for PostingBatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PostingBatchEvent::BatchCreated(_) => "journal.batch.created",
            PostingBatchEvent::BatchEntryAdded(_) => "journal.batch.entry_added",
            PostingBatchEvent::BatchApproved(_) => "journal.batch.approved",
            PostingBatchEvent::BatchRejected(_) => "journal.batch.rejected",
            PostingBatchEvent::BatchPosted(_) => "journal.batch.posted",
            PostingBatchEvent::BatchReversed(_) => "journal.batch.reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PostingBatchEvent::BatchCreated(e) => e.occurred_at,
            PostingBatchEvent::BatchEntryAdded(e) => e.occurred_at,
            PostingBatchEvent::BatchApproved(e) => e.occurred_at,
            PostingBatchEvent::BatchRejected(e) => e.occurred_at,
            PostingBatchEvent::BatchPosted(e) => e.occurred_at,
            PostingBatchEvent::BatchReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PostingBatch {
    type Command = PostingBatchCommand;
    type Event = PostingBatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PostingBatchEvent::BatchCreated(e) => {
                self.id = e.batch_id;
                self.batch_number = e.batch_number.clone();
                self.batch_date = e.batch_date;
                self.description = e.description.clone();
                self.period_id = e.period_id;
                self.status = BatchStatus::Pending;
                self.members.clear();
                self.recalculate_totals();
                self.created = true;
            }
            PostingBatchEvent::BatchEntryAdded(e) => {
                self.members.push(e.member.clone());
                self.recalculate_totals();
            }
            PostingBatchEvent::BatchApproved(e) => {
                self.status = BatchStatus::Approved;
                self.approved_by = Some(e.approver_id);
                self.approver_name = e.approver_name.clone();
                self.approved_at = Some(e.occurred_at);
            }
            PostingBatchEvent::BatchRejected(e) => {
                self.status = BatchStatus::Rejected;
                self.approver_name = Some(e.rejected_by.clone());
                self.approved_at = Some(e.occurred_at);
            }
            PostingBatchEvent::BatchPosted(e) => {
                self.status = BatchStatus::Posted;
                self.members = e.members.clone();
                self.recalculate_totals();
                self.posted_by = Some(e.posted_by.clone());
                self.posted_at = Some(e.occurred_at);
            }
            PostingBatchEvent::BatchReversed(e) => {
                self.status = BatchStatus::Reversed;
                self.reversed_by = Some(e.reversed_by.clone());
                self.reversed_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PostingBatchCommand::CreateBatch(cmd) => self.handle_create(cmd),
            PostingBatchCommand::AddEntry(cmd) => self.handle_add_entry(cmd),
            PostingBatchCommand::ApproveBatch(cmd) => self.handle_approve(cmd),
            PostingBatchCommand::RejectBatch(cmd) => self.handle_reject(cmd),
            PostingBatchCommand::PostBatch(cmd) => self.handle_post(cmd),
            PostingBatchCommand::ReverseBatch(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl PostingBatch {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<PostingBatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("posting batch already exists"));
        }
        if cmd.batch_number.trim().is_empty() {
            return Err(DomainError::validation("batch number is required"));
        }

        Ok(vec![PostingBatchEvent::BatchCreated(BatchCreated {
            batch_id: cmd.batch_id,
            batch_number: cmd.batch_number.trim().to_string(),
            batch_date: cmd.batch_date,
            description: cmd
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            period_id: cmd.period_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_entry(&self, cmd: &AddEntry) -> Result<Vec<PostingBatchEvent>, DomainError> {
        self.ensure_created()?;
        if self.status != BatchStatus::Pending {
            return Err(DomainError::conflict(
                "can only add entries to a pending batch",
            ));
        }
        if self
            .members
            .iter()
            .any(|m| m.entry_id == cmd.member.entry_id)
        {
            return Err(DomainError::conflict("entry is already in this batch"));
        }

        Ok(vec![PostingBatchEvent::BatchEntryAdded(BatchEntryAdded {
            batch_id: cmd.batch_id,
            member: cmd.member.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveBatch) -> Result<Vec<PostingBatchEvent>, DomainError> {
        self.ensure_created()?;
        match self.status {
            BatchStatus::Approved => Err(DomainError::conflict("batch already approved")),
            BatchStatus::Pending => Ok(vec![PostingBatchEvent::BatchApproved(BatchApproved {
                batch_id: cmd.batch_id,
                batch_number: self.batch_number.clone(),
                approver_id: cmd.approver_id,
                approver_name: cmd.approver_name.as_deref().map(|n| n.trim().to_string()),
                occurred_at: cmd.occurred_at,
            })]),
            _ => Err(DomainError::conflict("only pending batches can be approved")),
        }
    }

    fn handle_reject(&self, cmd: &RejectBatch) -> Result<Vec<PostingBatchEvent>, DomainError> {
        self.ensure_created()?;
        match self.status {
            BatchStatus::Rejected => Err(DomainError::conflict("batch already rejected")),
            BatchStatus::Pending => Ok(vec![PostingBatchEvent::BatchRejected(BatchRejected {
                batch_id: cmd.batch_id,
                batch_number: self.batch_number.clone(),
                rejected_by: cmd.rejected_by.trim().to_string(),
                occurred_at: cmd.occurred_at,
            })]),
            _ => Err(DomainError::conflict("only pending batches can be rejected")),
        }
    }

    fn handle_post(&self, cmd: &PostBatch) -> Result<Vec<PostingBatchEvent>, DomainError> {
        self.ensure_created()?;
        if self.status == BatchStatus::Posted {
            return Err(DomainError::conflict("batch is already posted"));
        }
        if self.status != BatchStatus::Approved {
            return Err(DomainError::conflict(
                "batch must be approved before posting",
            ));
        }

        // The refreshed summaries must cover exactly the recorded membership.
        let mut expected = self.entry_ids();
        let mut provided: Vec<_> = cmd.members.iter().map(|m| m.entry_id).collect();
        expected.sort_by_key(|id| *id.0.as_uuid());
        provided.sort_by_key(|id| *id.0.as_uuid());
        if expected != provided {
            return Err(DomainError::conflict(
                "batch membership changed since approval",
            ));
        }

        let total_debits: Decimal = cmd.members.iter().map(|m| m.total_debits).sum();
        let total_credits: Decimal = cmd.members.iter().map(|m| m.total_credits).sum();

        // Strict equality: no tolerance at batch level.
        if total_debits != total_credits {
            return Err(DomainError::invariant(format!(
                "batch is not balanced (debits: {total_debits}, credits: {total_credits})"
            )));
        }

        Ok(vec![PostingBatchEvent::BatchPosted(BatchPosted {
            batch_id: cmd.batch_id,
            batch_number: self.batch_number.clone(),
            batch_date: self.batch_date,
            members: cmd.members.clone(),
            posted_by: cmd.posted_by.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseBatch) -> Result<Vec<PostingBatchEvent>, DomainError> {
        self.ensure_created()?;
        if self.status != BatchStatus::Posted {
            return Err(DomainError::conflict("only posted batches can be reversed"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reversal reason is required"));
        }

        Ok(vec![PostingBatchEvent::BatchReversed(BatchReversed {
            batch_id: cmd.batch_id,
            batch_number: self.batch_number.clone(),
            entry_ids: self.entry_ids(),
            reversed_by: cmd.reversed_by.trim().to_string(),
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
