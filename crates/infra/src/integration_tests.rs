//! Integration tests for the full pipeline:
//! Command → EventStore → EventBus → Projection → TrialBalance → Close.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value as JsonValue;

use ledgerkit_core::{AccountId, AggregateId, ExpectedVersion, UserId};
use ledgerkit_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use ledgerkit_journal::{
    AddLine, ApproveBatch, CreateBatch, CreateEntry, JournalEntryCommand, JournalEntryEvent,
    JournalEntryId, PostingBatchCommand, PostingBatchId,
};
use ledgerkit_ledger::{AccountType, CreateTrialBalance, TrialBalanceId, TrialBalanceStatus};
use ledgerkit_close::{
    AttachTrialBalance, CloseTask, CloseType, CompleteClose, CompleteCloseTask, InitiateClose,
    PeriodCloseCommand, PeriodCloseId,
};
use ledgerkit_period::{ClosePeriod, CreatePeriod, PeriodCommand, PeriodId, PeriodType};

use crate::command_dispatcher::DispatchError;
use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::posting::{AccountInfo, PostingService};
use crate::projections::AccountBalances;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Service = PostingService<InMemoryEventStore, Bus>;

fn setup() -> (Service, Subscription<EventEnvelope<JsonValue>>) {
    ledgerkit_observability::init();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let subscription = bus.subscribe();
    let service = PostingService::new(InMemoryEventStore::new(), bus);
    (service, subscription)
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn open_period(service: &Service) -> PeriodId {
    let period_id = PeriodId::new(AggregateId::new());
    service
        .execute_period(PeriodCommand::CreatePeriod(CreatePeriod {
            period_id,
            name: "2025-09".to_string(),
            start_date: date(2025, 9, 1),
            end_date: date(2025, 9, 30),
            fiscal_year: 2025,
            period_type: PeriodType::Monthly,
            is_adjustment_period: false,
            occurred_at: now(),
        }))
        .unwrap();
    period_id
}

/// A two-line entry: debit `amount` to `debit_account`, credit `amount` to
/// `credit_account`.
fn balanced_entry(
    service: &Service,
    period_id: PeriodId,
    debit_account: AccountId,
    credit_account: AccountId,
    amount: Decimal,
    entry_date: NaiveDate,
) -> JournalEntryId {
    let entry_id = JournalEntryId::new(AggregateId::new());
    service
        .execute_entry(JournalEntryCommand::CreateEntry(CreateEntry {
            entry_id,
            date: entry_date,
            reference_number: "INV-2025-001".to_string(),
            description: "integration entry".to_string(),
            source: "BillingSystem".to_string(),
            period_id: Some(period_id),
            original_amount: amount,
            occurred_at: now(),
        }))
        .unwrap();
    service
        .execute_entry(JournalEntryCommand::AddLine(AddLine {
            entry_id,
            account_id: debit_account,
            debit: amount,
            credit: Decimal::ZERO,
            memo: None,
            reference: None,
            occurred_at: now(),
        }))
        .unwrap();
    service
        .execute_entry(JournalEntryCommand::AddLine(AddLine {
            entry_id,
            account_id: credit_account,
            debit: Decimal::ZERO,
            credit: amount,
            memo: None,
            reference: None,
            occurred_at: now(),
        }))
        .unwrap();
    entry_id
}

fn approved_batch(service: &Service, period_id: PeriodId, entry_ids: &[JournalEntryId]) -> PostingBatchId {
    let batch_id = PostingBatchId::new(AggregateId::new());
    service
        .execute_batch(PostingBatchCommand::CreateBatch(CreateBatch {
            batch_id,
            batch_number: "BATCH-2025-09-001".to_string(),
            batch_date: date(2025, 9, 30),
            description: None,
            period_id: Some(period_id),
            occurred_at: now(),
        }))
        .unwrap();
    for entry_id in entry_ids {
        service.add_entry_to_batch(batch_id, *entry_id, now()).unwrap();
    }
    service
        .execute_batch(PostingBatchCommand::ApproveBatch(ApproveBatch {
            batch_id,
            approver_id: UserId::new(),
            approver_name: Some("Supervisor".to_string()),
            occurred_at: now(),
        }))
        .unwrap();
    batch_id
}

fn directory(accounts: &[AccountId]) -> HashMap<AccountId, String> {
    accounts
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, format!("{}", 1000 + i as u32 * 1000)))
        .collect()
}

/// Count journal-entry events of a given type across drained envelopes.
fn count_entry_events(envelopes: &[EventEnvelope<JsonValue>], event_type: &str) -> usize {
    envelopes
        .iter()
        .filter(|env| env.aggregate_type() == "journal.entry")
        .filter_map(|env| {
            serde_json::from_value::<JournalEntryEvent>(env.payload().clone()).ok()
        })
        .filter(|ev| ev.event_type() == event_type)
        .count()
}

#[test]
fn posting_an_entry_derives_posted_ledger_rows() {
    let (service, subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let revenue = AccountId::new();
    let dir = directory(&[cash, revenue]);

    let entry_id = balanced_entry(&service, period_id, cash, revenue, dec!(1000), date(2025, 9, 19));
    let ledger_ids = service.post_entry(entry_id, "closer", now(), &dir).unwrap();
    assert_eq!(ledger_ids.len(), 2);

    let entry = service.load_entry(entry_id).unwrap();
    assert!(entry.is_posted());

    // Every derived ledger row is already posted, carries the source entry
    // id, and mirrors one line.
    for ledger_id in &ledger_ids {
        let row = service.load_ledger_entry(*ledger_id).unwrap();
        assert!(row.is_posted());
        assert_eq!(row.entry_id(), entry_id);
        assert_eq!(row.period_id(), Some(period_id));
        assert_eq!(row.source(), Some("JournalEntry"));
    }

    // Posting twice is a state conflict.
    let err = service.post_entry(entry_id, "closer", now(), &dir).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    // The projection sees exactly the two posted rows.
    let mut balances = AccountBalances::new();
    balances.apply_all(&subscription.drain()).unwrap();
    assert_eq!(balances.len(), 2);
    let cash_code = &dir[&cash];
    assert_eq!(balances.get(cash_code).unwrap().debit_total, dec!(1000));
}

#[test]
fn period_gate_blocks_closed_periods_and_out_of_range_dates() {
    let (service, _subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let revenue = AccountId::new();
    let dir = directory(&[cash, revenue]);

    // Entry dated outside the period.
    let stray = balanced_entry(&service, period_id, cash, revenue, dec!(100), date(2025, 10, 2));
    let err = service.post_entry(stray, "closer", now(), &dir).unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));

    // Close the period; in-range entries are now refused too.
    let in_range = balanced_entry(&service, period_id, cash, revenue, dec!(100), date(2025, 9, 15));
    service
        .execute_period(PeriodCommand::ClosePeriod(ClosePeriod {
            period_id,
            occurred_at: now(),
        }))
        .unwrap();
    let err = service.post_entry(in_range, "closer", now(), &dir).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));

    let entry = service.load_entry(in_range).unwrap();
    assert!(!entry.is_posted());
}

#[test]
fn batch_posting_posts_every_member_and_reversal_signals_every_member() {
    let (service, subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let revenue = AccountId::new();
    let dir = directory(&[cash, revenue]);

    let e1 = balanced_entry(&service, period_id, cash, revenue, dec!(500), date(2025, 9, 10));
    let e2 = balanced_entry(&service, period_id, cash, revenue, dec!(500), date(2025, 9, 11));
    let batch_id = approved_batch(&service, period_id, &[e1, e2]);

    let ledger_ids = service.post_batch(batch_id, "closer", now(), &dir).unwrap();
    assert_eq!(ledger_ids.len(), 4);
    assert!(service.load_entry(e1).unwrap().is_posted());
    assert!(service.load_entry(e2).unwrap().is_posted());

    let batch = service.load_batch(batch_id).unwrap();
    assert_eq!(batch.total_debits(), dec!(1000));
    assert_eq!(batch.posted_by(), Some("closer"));

    service
        .reverse_batch(batch_id, "supervisor", "posted to wrong period", date(2025, 9, 30), now())
        .unwrap();

    let envelopes = subscription.drain();
    assert_eq!(count_entry_events(&envelopes, "journal.entry.posted"), 2);
    assert_eq!(count_entry_events(&envelopes, "journal.entry.reversed"), 2);

    // Reversal is a signal: the member entries stay posted.
    assert!(service.load_entry(e1).unwrap().is_posted());
}

#[test]
fn batch_posting_is_all_or_nothing() {
    let (service, subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let revenue = AccountId::new();
    let dir = directory(&[cash, revenue]);

    let good = balanced_entry(&service, period_id, cash, revenue, dec!(500), date(2025, 9, 10));

    // An unbalanced member: debit 300, credit 200.
    let bad = JournalEntryId::new(AggregateId::new());
    service
        .execute_entry(JournalEntryCommand::CreateEntry(CreateEntry {
            entry_id: bad,
            date: date(2025, 9, 12),
            reference_number: "INV-2025-002".to_string(),
            description: "unbalanced".to_string(),
            source: "ManualEntry".to_string(),
            period_id: Some(period_id),
            original_amount: Decimal::ZERO,
            occurred_at: now(),
        }))
        .unwrap();
    service
        .execute_entry(JournalEntryCommand::AddLine(AddLine {
            entry_id: bad,
            account_id: cash,
            debit: dec!(300),
            credit: Decimal::ZERO,
            memo: None,
            reference: None,
            occurred_at: now(),
        }))
        .unwrap();
    service
        .execute_entry(JournalEntryCommand::AddLine(AddLine {
            entry_id: bad,
            account_id: revenue,
            debit: Decimal::ZERO,
            credit: dec!(200),
            memo: None,
            reference: None,
            occurred_at: now(),
        }))
        .unwrap();

    let batch_id = approved_batch(&service, period_id, &[good, bad]);
    let err = service.post_batch(batch_id, "closer", now(), &dir).unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));

    // No member entry was posted, the batch did not transition, and no
    // ledger row was derived.
    assert!(!service.load_entry(good).unwrap().is_posted());
    assert!(!service.load_entry(bad).unwrap().is_posted());
    let envelopes = subscription.drain();
    assert_eq!(count_entry_events(&envelopes, "journal.entry.posted"), 0);
    assert!(!envelopes.iter().any(|e| e.aggregate_type() == "ledger.entry"));
}

#[test]
fn trial_balance_generated_from_posted_ledger_finalizes() {
    let (service, subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let loan = AccountId::new();
    let capital = AccountId::new();
    let mut dir = HashMap::new();
    dir.insert(cash, "1000".to_string());
    dir.insert(loan, "2000".to_string());
    dir.insert(capital, "3000".to_string());

    // Debit cash 2000 against loan, debit cash 3000 against capital:
    // Assets 5000 = Liabilities 2000 + Equity 3000.
    let e1 = balanced_entry(&service, period_id, cash, loan, dec!(2000), date(2025, 9, 5));
    let e2 = balanced_entry(&service, period_id, cash, capital, dec!(3000), date(2025, 9, 6));
    service.post_entry(e1, "closer", now(), &dir).unwrap();
    service.post_entry(e2, "closer", now(), &dir).unwrap();

    let mut balances = AccountBalances::new();
    balances.apply_all(&subscription.drain()).unwrap();

    let mut accounts = HashMap::new();
    accounts.insert("1000".to_string(), AccountInfo { name: "Cash".to_string(), account_type: AccountType::Asset });
    accounts.insert("2000".to_string(), AccountInfo { name: "Loans Payable".to_string(), account_type: AccountType::Liability });
    accounts.insert("3000".to_string(), AccountInfo { name: "Member Capital".to_string(), account_type: AccountType::Equity });

    let trial_balance_id = TrialBalanceId::new(AggregateId::new());
    let tb = service
        .generate_trial_balance(
            CreateTrialBalance {
                trial_balance_id,
                number: "TB-2025-09".to_string(),
                period_id,
                period_start: date(2025, 9, 1),
                period_end: date(2025, 9, 30),
                include_zero_balances: false,
                description: None,
                notes: None,
                occurred_at: now(),
            },
            &balances,
            &accounts,
        )
        .unwrap();

    assert_eq!(tb.line_items().len(), 3);
    assert!(tb.is_balanced());
    assert_eq!(tb.total_debits(), dec!(5000));
    assert_eq!(tb.totals().total_assets, dec!(5000));
    assert!(tb.accounting_equation_balances());

    service
        .execute_trial_balance(ledgerkit_ledger::TrialBalanceCommand::FinalizeTrialBalance(
            ledgerkit_ledger::FinalizeTrialBalance {
                trial_balance_id,
                finalized_by: "controller".to_string(),
                occurred_at: now(),
            },
        ))
        .unwrap();
    let tb = service.load_trial_balance(trial_balance_id).unwrap();
    assert_eq!(tb.status(), TrialBalanceStatus::Finalized);

    // Read models are disposable: rebuilding from the store yields the same
    // balances the live subscription produced.
    let rebuilt = AccountBalances::rebuild_from_scratch(
        service
            .dispatcher()
            .store()
            .load_all()
            .unwrap()
            .iter()
            .map(|e| e.to_envelope()),
    )
    .unwrap();
    assert_eq!(rebuilt.get("1000").unwrap().debit_total, dec!(5000));
}

#[test]
fn period_close_consumes_trial_balance_and_locks_the_period() {
    let (service, subscription) = setup();
    let period_id = open_period(&service);
    let cash = AccountId::new();
    let capital = AccountId::new();
    let mut dir = HashMap::new();
    dir.insert(cash, "1000".to_string());
    dir.insert(capital, "3000".to_string());

    let entry = balanced_entry(&service, period_id, cash, capital, dec!(750), date(2025, 9, 10));
    service.post_entry(entry, "closer", now(), &dir).unwrap();

    let mut balances = AccountBalances::new();
    balances.apply_all(&subscription.drain()).unwrap();
    let mut accounts = HashMap::new();
    accounts.insert("1000".to_string(), AccountInfo { name: "Cash".to_string(), account_type: AccountType::Asset });
    accounts.insert("3000".to_string(), AccountInfo { name: "Member Capital".to_string(), account_type: AccountType::Equity });

    let trial_balance_id = TrialBalanceId::new(AggregateId::new());
    let tb = service
        .generate_trial_balance(
            CreateTrialBalance {
                trial_balance_id,
                number: "TB-2025-09".to_string(),
                period_id,
                period_start: date(2025, 9, 1),
                period_end: date(2025, 9, 30),
                include_zero_balances: false,
                description: None,
                notes: None,
                occurred_at: now(),
            },
            &balances,
            &accounts,
        )
        .unwrap();
    assert!(tb.is_balanced());

    // Drive the close checklist.
    let close_id = PeriodCloseId::new(AggregateId::new());
    service
        .execute_close(PeriodCloseCommand::InitiateClose(InitiateClose {
            close_id,
            close_number: "CLOSE-2025-09".to_string(),
            period_id,
            close_type: CloseType::MonthEnd,
            period_start: date(2025, 9, 1),
            period_end: date(2025, 9, 30),
            initiated_by: "controller".to_string(),
            notes: None,
            occurred_at: now(),
        }))
        .unwrap();
    service
        .execute_close(PeriodCloseCommand::AttachTrialBalance(AttachTrialBalance {
            close_id,
            trial_balance_id,
            is_balanced: tb.is_balanced(),
            occurred_at: now(),
        }))
        .unwrap();
    for task in [
        CloseTask::PostAllJournalEntries,
        CloseTask::CompleteBankReconciliations,
        CloseTask::ReconcileApSubsidiaryLedger,
        CloseTask::ReconcileArSubsidiaryLedger,
        CloseTask::PostFixedAssetDepreciation,
        CloseTask::AmortizePrepaidExpenses,
        CloseTask::PostAccruals,
    ] {
        service
            .execute_close(PeriodCloseCommand::CompleteTask(CompleteCloseTask {
                close_id,
                task,
                occurred_at: now(),
            }))
            .unwrap();
    }
    service
        .execute_close(PeriodCloseCommand::CompleteClose(CompleteClose {
            close_id,
            completed_by: "controller".to_string(),
            occurred_at: now(),
        }))
        .unwrap();
    let close = service.load_close(close_id).unwrap();
    assert!(close.is_complete());

    // The final lock: close the accounting period; late postings bounce off
    // the period gate.
    service
        .execute_period(PeriodCommand::ClosePeriod(ClosePeriod {
            period_id,
            occurred_at: now(),
        }))
        .unwrap();
    let late = balanced_entry(&service, period_id, cash, capital, dec!(10), date(2025, 9, 29));
    let err = service.post_entry(late, "closer", now(), &dir).unwrap_err();
    assert!(matches!(err, DispatchError::Conflict(_)));
}

#[test]
fn store_detects_stale_appends() {
    let store = InMemoryEventStore::new();
    let aggregate_id = AggregateId::new();
    let event = ledgerkit_period::PeriodEvent::PeriodClosed(ledgerkit_period::PeriodClosed {
        period_id: PeriodId::new(aggregate_id),
        name: "2025-09".to_string(),
        end_date: date(2025, 9, 30),
        occurred_at: now(),
    });

    let make = |ev: &ledgerkit_period::PeriodEvent| {
        UncommittedEvent::from_typed(aggregate_id, "accounting.period", uuid::Uuid::now_v7(), ev)
            .unwrap()
    };

    store
        .append(vec![make(&event)], ExpectedVersion::Exact(0))
        .unwrap();

    // A writer holding a stale version must be rejected.
    let err = store
        .append(vec![make(&event)], ExpectedVersion::Exact(0))
        .unwrap_err();
    assert!(matches!(err, crate::event_store::EventStoreError::Concurrency(_)));

    // Any-version appends skip the check.
    store
        .append(vec![make(&event)], ExpectedVersion::Any)
        .unwrap();
    assert_eq!(store.load_stream(aggregate_id).unwrap().len(), 2);
}
