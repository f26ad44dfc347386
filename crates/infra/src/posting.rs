//! Posting orchestration.
//!
//! `PostingService` is the single writer that sequences cross-aggregate
//! workflows the aggregates themselves cannot see:
//!
//! - the period gate: a journal entry only posts when its accounting period
//!   exists, is open, and contains the entry date;
//! - two-phase batch posting: every member entry and the batch itself are
//!   validated against a dry run before any command is dispatched, so a
//!   failure never leaves a partially posted batch;
//! - ledger derivation: posting an entry materializes one posted general
//!   ledger row per line, carrying the source entry id;
//! - trial balance generation from the account balances read model.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use ledgerkit_close::{FiscalPeriodClose, PeriodCloseCommand, PeriodCloseId};
use ledgerkit_core::{AccountId, Aggregate, AggregateId, AggregateRoot};
use ledgerkit_events::{EventBus, EventEnvelope};
use ledgerkit_journal::{
    AddEntry, BatchMember, JournalEntry, JournalEntryCommand, JournalEntryId, PostBatch,
    PostEntry, PostingBatch, PostingBatchCommand, PostingBatchId, ReverseBatch, ReverseEntry,
};
use ledgerkit_ledger::{
    AccountType, AddLineItem, CreateLedgerEntry, CreateTrialBalance, GeneralLedgerEntry,
    LedgerEntryCommand, LedgerEntryId, PostLedgerEntry, TrialBalance, TrialBalanceCommand,
    TrialBalanceId,
};
use ledgerkit_period::{AccountingPeriod, PeriodCommand, PeriodId};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::AccountBalances;

/// Stream/aggregate type identifiers.
pub const JOURNAL_ENTRY: &str = "journal.entry";
pub const POSTING_BATCH: &str = "journal.batch";
pub const LEDGER_ENTRY: &str = "ledger.entry";
pub const TRIAL_BALANCE: &str = "ledger.trial_balance";
pub const ACCOUNTING_PERIOD: &str = "accounting.period";
pub const PERIOD_CLOSE: &str = "close.fiscal_period";

/// Chart-of-accounts lookup supplied by the external collaborator.
///
/// The core treats account ids as opaque keys; ledger rows denormalize the
/// account code (and optionally the USOA class) resolved through this trait.
pub trait AccountDirectory {
    fn account_code(&self, account_id: AccountId) -> Option<String>;

    fn usoa_class(&self, _account_id: AccountId) -> Option<String> {
        None
    }
}

impl AccountDirectory for HashMap<AccountId, String> {
    fn account_code(&self, account_id: AccountId) -> Option<String> {
        self.get(&account_id).cloned()
    }
}

/// Chart-of-accounts metadata for trial balance rows, keyed by account code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub account_type: AccountType,
}

/// Single-writer orchestration over the command dispatcher.
#[derive(Debug)]
pub struct PostingService<S, B> {
    dispatcher: CommandDispatcher<S, B>,
}

impl<S, B> PostingService<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }
}

impl<S, B> PostingService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    // -- thin command forwarding, one per aggregate ---------------------

    pub fn execute_period(&self, cmd: PeriodCommand) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(ACCOUNTING_PERIOD, cmd, |id| {
            AccountingPeriod::empty(PeriodId::new(id))
        })
    }

    pub fn execute_entry(
        &self,
        cmd: JournalEntryCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(JOURNAL_ENTRY, cmd, |id| {
            JournalEntry::empty(JournalEntryId::new(id))
        })
    }

    pub fn execute_batch(
        &self,
        cmd: PostingBatchCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(POSTING_BATCH, cmd, |id| {
            PostingBatch::empty(PostingBatchId::new(id))
        })
    }

    pub fn execute_ledger(
        &self,
        cmd: LedgerEntryCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(LEDGER_ENTRY, cmd, |id| {
            GeneralLedgerEntry::empty(LedgerEntryId::new(id))
        })
    }

    pub fn execute_trial_balance(
        &self,
        cmd: TrialBalanceCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(TRIAL_BALANCE, cmd, |id| {
            TrialBalance::empty(TrialBalanceId::new(id))
        })
    }

    pub fn execute_close(
        &self,
        cmd: PeriodCloseCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(PERIOD_CLOSE, cmd, |id| {
            FiscalPeriodClose::empty(PeriodCloseId::new(id))
        })
    }

    // -- state reads ----------------------------------------------------

    pub fn load_entry(&self, id: JournalEntryId) -> Result<JournalEntry, DispatchError> {
        self.load_existing(id.0, |aid| JournalEntry::empty(JournalEntryId::new(aid)))
    }

    pub fn load_batch(&self, id: PostingBatchId) -> Result<PostingBatch, DispatchError> {
        self.load_existing(id.0, |aid| PostingBatch::empty(PostingBatchId::new(aid)))
    }

    pub fn load_period(&self, id: PeriodId) -> Result<AccountingPeriod, DispatchError> {
        self.load_existing(id.0, |aid| AccountingPeriod::empty(PeriodId::new(aid)))
    }

    pub fn load_ledger_entry(
        &self,
        id: LedgerEntryId,
    ) -> Result<GeneralLedgerEntry, DispatchError> {
        self.load_existing(id.0, |aid| GeneralLedgerEntry::empty(LedgerEntryId::new(aid)))
    }

    pub fn load_trial_balance(&self, id: TrialBalanceId) -> Result<TrialBalance, DispatchError> {
        self.load_existing(id.0, |aid| TrialBalance::empty(TrialBalanceId::new(aid)))
    }

    pub fn load_close(&self, id: PeriodCloseId) -> Result<FiscalPeriodClose, DispatchError> {
        self.load_existing(id.0, |aid| FiscalPeriodClose::empty(PeriodCloseId::new(aid)))
    }

    fn load_existing<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: serde::de::DeserializeOwned,
    {
        let aggregate = self.dispatcher.load(aggregate_id, make_aggregate)?;
        if aggregate.version() == 0 {
            return Err(DispatchError::NotFound);
        }
        Ok(aggregate)
    }

    // -- cross-aggregate workflows --------------------------------------

    /// Snapshot a live entry's totals and add it to a pending batch.
    pub fn add_entry_to_batch(
        &self,
        batch_id: PostingBatchId,
        entry_id: JournalEntryId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let entry = self.load_entry(entry_id)?;
        self.execute_batch(PostingBatchCommand::AddEntry(AddEntry {
            batch_id,
            member: BatchMember::summarize(&entry),
            occurred_at,
        }))?;
        Ok(())
    }

    /// Post a single journal entry through the period gate and derive its
    /// general ledger rows.
    pub fn post_entry(
        &self,
        entry_id: JournalEntryId,
        posted_by: &str,
        occurred_at: DateTime<Utc>,
        directory: &impl AccountDirectory,
    ) -> Result<Vec<LedgerEntryId>, DispatchError> {
        let entry = self.load_entry(entry_id)?;
        self.check_period_gate(&entry)?;
        check_accounts_resolvable(&entry, directory)?;

        self.execute_entry(JournalEntryCommand::PostEntry(PostEntry {
            entry_id,
            occurred_at,
        }))?;

        let ledger_ids = self.derive_ledger_rows(&entry, posted_by, occurred_at, directory)?;
        info!(
            entry = %entry_id,
            ledger_rows = ledger_ids.len(),
            "journal entry posted"
        );
        Ok(ledger_ids)
    }

    /// Post an approved batch: validate everything, then commit.
    ///
    /// Phase 1 dry-runs the batch post (fresh member totals, strict balance)
    /// and every member entry's post (unposted, balanced, period gate,
    /// resolvable accounts) without dispatching a single command. Only when
    /// the whole batch is known to succeed does phase 2 dispatch the entry
    /// posts, the batch post and the ledger derivation. A precondition
    /// failure therefore leaves no member entry posted.
    pub fn post_batch(
        &self,
        batch_id: PostingBatchId,
        posted_by: &str,
        occurred_at: DateTime<Utc>,
        directory: &impl AccountDirectory,
    ) -> Result<Vec<LedgerEntryId>, DispatchError> {
        let batch = self.load_batch(batch_id)?;

        // Phase 1: validate.
        let mut entries = Vec::with_capacity(batch.entry_count());
        for entry_id in batch.entry_ids() {
            entries.push(self.load_entry(entry_id)?);
        }
        let members: Vec<BatchMember> = entries.iter().map(BatchMember::summarize).collect();

        let post_cmd = PostingBatchCommand::PostBatch(PostBatch {
            batch_id,
            posted_by: posted_by.to_string(),
            members,
            occurred_at,
        });
        batch.handle(&post_cmd)?;

        for entry in &entries {
            entry.handle(&JournalEntryCommand::PostEntry(PostEntry {
                entry_id: entry.id_typed(),
                occurred_at,
            }))?;
            self.check_period_gate(entry)?;
            check_accounts_resolvable(entry, directory)?;
        }

        // Phase 2: commit.
        for entry in &entries {
            self.execute_entry(JournalEntryCommand::PostEntry(PostEntry {
                entry_id: entry.id_typed(),
                occurred_at,
            }))?;
        }
        self.execute_batch(post_cmd)?;

        let mut ledger_ids = Vec::new();
        for entry in &entries {
            ledger_ids.extend(self.derive_ledger_rows(entry, posted_by, occurred_at, directory)?);
        }

        info!(
            batch = %batch_id,
            entries = entries.len(),
            ledger_rows = ledger_ids.len(),
            "posting batch committed"
        );
        Ok(ledger_ids)
    }

    /// Reverse a posted batch: every member entry emits a reversal signal,
    /// then the batch transitions to its terminal Reversed state.
    pub fn reverse_batch(
        &self,
        batch_id: PostingBatchId,
        reversed_by: &str,
        reason: &str,
        reversal_date: NaiveDate,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let batch = self.load_batch(batch_id)?;

        // Phase 1: validate.
        let reverse_cmd = PostingBatchCommand::ReverseBatch(ReverseBatch {
            batch_id,
            reversed_by: reversed_by.to_string(),
            reason: reason.to_string(),
            occurred_at,
        });
        batch.handle(&reverse_cmd)?;

        let mut entries = Vec::with_capacity(batch.entry_count());
        for entry_id in batch.entry_ids() {
            let entry = self.load_entry(entry_id)?;
            entry.handle(&JournalEntryCommand::ReverseEntry(ReverseEntry {
                entry_id,
                reversal_date,
                reason: reason.to_string(),
                occurred_at,
            }))?;
            entries.push(entry);
        }

        // Phase 2: commit.
        for entry in &entries {
            self.execute_entry(JournalEntryCommand::ReverseEntry(ReverseEntry {
                entry_id: entry.id_typed(),
                reversal_date,
                reason: reason.to_string(),
                occurred_at,
            }))?;
        }
        self.execute_batch(reverse_cmd)?;

        info!(batch = %batch_id, entries = entries.len(), "posting batch reversed");
        Ok(())
    }

    /// Materialize a trial balance from the account balances read model and
    /// caller-supplied chart-of-accounts metadata.
    pub fn generate_trial_balance(
        &self,
        create: CreateTrialBalance,
        balances: &AccountBalances,
        accounts: &HashMap<String, AccountInfo>,
    ) -> Result<TrialBalance, DispatchError> {
        // Validate metadata coverage before dispatching anything.
        for row in balances.sorted() {
            if !accounts.contains_key(&row.account_code) {
                return Err(DispatchError::Validation(format!(
                    "no account metadata for account code '{}'",
                    row.account_code
                )));
            }
        }

        let trial_balance_id = create.trial_balance_id;
        let occurred_at = create.occurred_at;
        self.execute_trial_balance(TrialBalanceCommand::CreateTrialBalance(create))?;

        for row in balances.sorted() {
            let info = &accounts[&row.account_code];
            let (debit_balance, credit_balance) = row.column_balances();
            self.execute_trial_balance(TrialBalanceCommand::AddLineItem(AddLineItem {
                trial_balance_id,
                account_code: row.account_code.clone(),
                account_name: info.name.clone(),
                account_type: info.account_type,
                debit_balance,
                credit_balance,
                occurred_at,
            }))?;
        }

        debug!(
            trial_balance = %trial_balance_id,
            accounts = balances.len(),
            "trial balance generated"
        );
        self.load_trial_balance(trial_balance_id)
    }

    // -- internals ------------------------------------------------------

    /// The cross-aggregate invariant the aggregates cannot enforce alone:
    /// an entry with a period reference only posts into an open period that
    /// contains its date.
    fn check_period_gate(&self, entry: &JournalEntry) -> Result<(), DispatchError> {
        let Some(period_id) = entry.period_id() else {
            return Ok(());
        };

        let period = self.load_period(period_id)?;
        if period.is_closed() {
            return Err(DispatchError::Conflict(format!(
                "accounting period '{}' is closed to postings",
                period.name()
            )));
        }
        if !period.is_date_in_period(entry.date()) {
            return Err(DispatchError::InvariantViolation(format!(
                "entry date {} falls outside accounting period '{}' ({} - {})",
                entry.date(),
                period.name(),
                period.start_date(),
                period.end_date()
            )));
        }
        Ok(())
    }

    /// One posted general ledger row per entry line.
    fn derive_ledger_rows(
        &self,
        entry: &JournalEntry,
        posted_by: &str,
        occurred_at: DateTime<Utc>,
        directory: &impl AccountDirectory,
    ) -> Result<Vec<LedgerEntryId>, DispatchError> {
        let mut ledger_ids = Vec::with_capacity(entry.lines().len());

        for line in entry.lines() {
            let account_code = directory.account_code(line.account_id()).ok_or_else(|| {
                DispatchError::Validation(format!(
                    "account {} is not in the chart of accounts",
                    line.account_id()
                ))
            })?;

            let ledger_id = LedgerEntryId::new(AggregateId::new());
            self.execute_ledger(LedgerEntryCommand::CreateLedgerEntry(CreateLedgerEntry {
                ledger_id,
                entry_id: entry.id_typed(),
                account_id: line.account_id(),
                account_code,
                debit: line.debit(),
                credit: line.credit(),
                transaction_date: entry.date(),
                usoa_class: directory.usoa_class(line.account_id()),
                memo: line.memo().map(str::to_string),
                reference_number: line.reference().map(str::to_string),
                source: Some("JournalEntry".to_string()),
                source_id: Some(entry.id_typed().0),
                period_id: entry.period_id(),
                occurred_at,
            }))?;
            self.execute_ledger(LedgerEntryCommand::PostLedgerEntry(PostLedgerEntry {
                ledger_id,
                posted_by: posted_by.to_string(),
                occurred_at,
            }))?;
            ledger_ids.push(ledger_id);
        }

        Ok(ledger_ids)
    }
}

fn check_accounts_resolvable(
    entry: &JournalEntry,
    directory: &impl AccountDirectory,
) -> Result<(), DispatchError> {
    for line in entry.lines() {
        if directory.account_code(line.account_id()).is_none() {
            return Err(DispatchError::Validation(format!(
                "account {} is not in the chart of accounts",
                line.account_id()
            )));
        }
    }
    Ok(())
}
