use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{AccountId, Aggregate, AggregateId, AggregateRoot, DomainError};
use ledgerkit_events::{Command, Event};
use ledgerkit_journal::JournalEntryId;
use ledgerkit_period::PeriodId;

/// General ledger entry identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerEntryId(pub AggregateId);

impl LedgerEntryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerEntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: GeneralLedgerEntry.
///
/// A denormalized record of one account impact, derived from a posted journal
/// entry. The system of record for account balances: once posted, this is the
/// strictest immutability boundary in the system, and even metadata-only
/// updates are refused to preserve audit integrity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralLedgerEntry {
    id: LedgerEntryId,
    entry_id: JournalEntryId,
    account_id: AccountId,
    /// Account code from the chart of accounts, denormalized for queries.
    account_code: String,
    debit: Decimal,
    credit: Decimal,
    transaction_date: NaiveDate,
    /// USOA class for regulatory reporting (Generation, Transmission, ...).
    usoa_class: Option<String>,
    memo: Option<String>,
    reference_number: Option<String>,
    source: Option<String>,
    source_id: Option<AggregateId>,
    period_id: Option<PeriodId>,
    is_posted: bool,
    posted_by: Option<String>,
    posted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl GeneralLedgerEntry {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerEntryId) -> Self {
        Self {
            id,
            entry_id: JournalEntryId::new(AggregateId::from_uuid(uuid::Uuid::nil())),
            account_id: AccountId::from_uuid(uuid::Uuid::nil()),
            account_code: String::new(),
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            transaction_date: NaiveDate::MIN,
            usoa_class: None,
            memo: None,
            reference_number: None,
            source: None,
            source_id: None,
            period_id: None,
            is_posted: false,
            posted_by: None,
            posted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LedgerEntryId {
        self.id
    }

    pub fn entry_id(&self) -> JournalEntryId {
        self.entry_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn account_code(&self) -> &str {
        &self.account_code
    }

    pub fn debit(&self) -> Decimal {
        self.debit
    }

    pub fn credit(&self) -> Decimal {
        self.credit
    }

    pub fn transaction_date(&self) -> NaiveDate {
        self.transaction_date
    }

    pub fn usoa_class(&self) -> Option<&str> {
        self.usoa_class.as_deref()
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn source_id(&self) -> Option<AggregateId> {
        self.source_id
    }

    pub fn period_id(&self) -> Option<PeriodId> {
        self.period_id
    }

    pub fn is_posted(&self) -> bool {
        self.is_posted
    }

    pub fn posted_by(&self) -> Option<&str> {
        self.posted_by.as_deref()
    }
}

impl AggregateRoot for GeneralLedgerEntry {
    type Id = LedgerEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLedgerEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLedgerEntry {
    pub ledger_id: LedgerEntryId,
    pub entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub transaction_date: NaiveDate,
    pub usoa_class: Option<String>,
    pub memo: Option<String>,
    pub reference_number: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<AggregateId>,
    pub period_id: Option<PeriodId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostLedgerEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostLedgerEntry {
    pub ledger_id: LedgerEntryId,
    pub posted_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLedgerEntry. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLedgerEntry {
    pub ledger_id: LedgerEntryId,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub memo: Option<String>,
    pub usoa_class: Option<String>,
    pub reference_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryCommand {
    CreateLedgerEntry(CreateLedgerEntry),
    PostLedgerEntry(PostLedgerEntry),
    UpdateLedgerEntry(UpdateLedgerEntry),
}

impl Command for LedgerEntryCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            LedgerEntryCommand::CreateLedgerEntry(c) => c.ledger_id.0,
            LedgerEntryCommand::PostLedgerEntry(c) => c.ledger_id.0,
            LedgerEntryCommand::UpdateLedgerEntry(c) => c.ledger_id.0,
        }
    }
}

/// Event: LedgerEntryCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryCreated {
    pub ledger_id: LedgerEntryId,
    pub entry_id: JournalEntryId,
    pub account_id: AccountId,
    pub account_code: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub transaction_date: NaiveDate,
    pub usoa_class: Option<String>,
    pub memo: Option<String>,
    pub reference_number: Option<String>,
    pub source: Option<String>,
    pub source_id: Option<AggregateId>,
    pub period_id: Option<PeriodId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LedgerEntryPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryPosted {
    pub ledger_id: LedgerEntryId,
    pub account_id: AccountId,
    pub account_code: String,
    pub transaction_date: NaiveDate,
    pub debit: Decimal,
    pub credit: Decimal,
    pub posted_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LedgerEntryUpdated. Carries merged values after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntryUpdated {
    pub ledger_id: LedgerEntryId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub memo: Option<String>,
    pub usoa_class: Option<String>,
    pub reference_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryEvent {
    LedgerEntryCreated(LedgerEntryCreated),
    LedgerEntryPosted(LedgerEntryPosted),
    LedgerEntryUpdated(LedgerEntryUpdated),
}

impl Event for LedgerEntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEntryEvent::LedgerEntryCreated(_) => "ledger.entry.created",
            LedgerEntryEvent::LedgerEntryPosted(_) => "ledger.entry.posted",
            LedgerEntryEvent::LedgerEntryUpdated(_) => "ledger.entry.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEntryEvent::LedgerEntryCreated(e) => e.occurred_at,
            LedgerEntryEvent::LedgerEntryPosted(e) => e.occurred_at,
            LedgerEntryEvent::LedgerEntryUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for GeneralLedgerEntry {
    type Command = LedgerEntryCommand;
    type Event = LedgerEntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEntryEvent::LedgerEntryCreated(e) => {
                self.id = e.ledger_id;
                self.entry_id = e.entry_id;
                self.account_id = e.account_id;
                self.account_code = e.account_code.clone();
                self.debit = e.debit;
                self.credit = e.credit;
                self.transaction_date = e.transaction_date;
                self.usoa_class = e.usoa_class.clone();
                self.memo = e.memo.clone();
                self.reference_number = e.reference_number.clone();
                self.source = e.source.clone();
                self.source_id = e.source_id;
                self.period_id = e.period_id;
                self.is_posted = false;
                self.created = true;
            }
            LedgerEntryEvent::LedgerEntryPosted(e) => {
                self.is_posted = true;
                self.posted_by = Some(e.posted_by.clone());
                self.posted_at = Some(e.occurred_at);
            }
            LedgerEntryEvent::LedgerEntryUpdated(e) => {
                self.debit = e.debit;
                self.credit = e.credit;
                self.memo = e.memo.clone();
                self.usoa_class = e.usoa_class.clone();
                self.reference_number = e.reference_number.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerEntryCommand::CreateLedgerEntry(cmd) => self.handle_create(cmd),
            LedgerEntryCommand::PostLedgerEntry(cmd) => self.handle_post(cmd),
            LedgerEntryCommand::UpdateLedgerEntry(cmd) => self.handle_update(cmd),
        }
    }
}

impl GeneralLedgerEntry {
    fn validate_amounts(debit: Decimal, credit: Decimal) -> Result<(), DomainError> {
        if debit < Decimal::ZERO || credit < Decimal::ZERO {
            return Err(DomainError::validation(
                "debit or credit amount cannot be negative",
            ));
        }
        if debit > Decimal::ZERO && credit > Decimal::ZERO {
            return Err(DomainError::validation(
                "ledger entry cannot carry both a debit and a credit",
            ));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLedgerEntry) -> Result<Vec<LedgerEntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("ledger entry already exists"));
        }
        Self::validate_amounts(cmd.debit, cmd.credit)?;
        if cmd.account_code.trim().is_empty() {
            return Err(DomainError::validation("account code is required"));
        }

        Ok(vec![LedgerEntryEvent::LedgerEntryCreated(
            LedgerEntryCreated {
                ledger_id: cmd.ledger_id,
                entry_id: cmd.entry_id,
                account_id: cmd.account_id,
                account_code: cmd.account_code.trim().to_string(),
                debit: cmd.debit,
                credit: cmd.credit,
                transaction_date: cmd.transaction_date,
                usoa_class: trimmed(&cmd.usoa_class),
                memo: trimmed(&cmd.memo),
                reference_number: trimmed(&cmd.reference_number),
                source: trimmed(&cmd.source),
                source_id: cmd.source_id,
                period_id: cmd.period_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_post(&self, cmd: &PostLedgerEntry) -> Result<Vec<LedgerEntryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.is_posted {
            return Err(DomainError::conflict(
                "ledger entry is already posted and cannot be modified",
            ));
        }
        if cmd.posted_by.trim().is_empty() {
            return Err(DomainError::validation("posted-by user is required"));
        }

        Ok(vec![LedgerEntryEvent::LedgerEntryPosted(LedgerEntryPosted {
            ledger_id: cmd.ledger_id,
            account_id: self.account_id,
            account_code: self.account_code.clone(),
            transaction_date: self.transaction_date,
            debit: self.debit,
            credit: self.credit,
            posted_by: cmd.posted_by.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateLedgerEntry) -> Result<Vec<LedgerEntryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        // Unconditional once posted, including metadata-only changes.
        if self.is_posted {
            return Err(DomainError::conflict(
                "cannot update posted general ledger entries",
            ));
        }

        let debit = cmd.debit.unwrap_or(self.debit);
        let credit = cmd.credit.unwrap_or(self.credit);
        Self::validate_amounts(debit, credit)?;

        let memo = merge_opt(&cmd.memo, &self.memo);
        let usoa_class = merge_opt(&cmd.usoa_class, &self.usoa_class);
        let reference_number = merge_opt(&cmd.reference_number, &self.reference_number);

        // No-change updates emit nothing.
        if debit == self.debit
            && credit == self.credit
            && memo == self.memo
            && usoa_class == self.usoa_class
            && reference_number == self.reference_number
        {
            return Ok(vec![]);
        }

        Ok(vec![LedgerEntryEvent::LedgerEntryUpdated(
            LedgerEntryUpdated {
                ledger_id: cmd.ledger_id,
                debit,
                credit,
                memo,
                usoa_class,
                reference_number,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn merge_opt(incoming: &Option<String>, current: &Option<String>) -> Option<String> {
    match trimmed(incoming) {
        Some(v) => Some(v),
        None => current.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkit_events::execute;
    use rust_decimal_macros::dec;

    fn test_ledger_id() -> LedgerEntryId {
        LedgerEntryId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 19).unwrap()
    }

    fn create_cmd(ledger_id: LedgerEntryId, debit: Decimal, credit: Decimal) -> CreateLedgerEntry {
        CreateLedgerEntry {
            ledger_id,
            entry_id: JournalEntryId::new(AggregateId::new()),
            account_id: AccountId::new(),
            account_code: "1000".to_string(),
            debit,
            credit,
            transaction_date: test_date(),
            usoa_class: Some("Distribution".to_string()),
            memo: None,
            reference_number: Some("INV-2025-001".to_string()),
            source: Some("JournalEntry".to_string()),
            source_id: None,
            period_id: None,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_rejects_negative_amounts() {
        let id = test_ledger_id();
        let ledger = GeneralLedgerEntry::empty(id);
        let err = ledger
            .handle(&LedgerEntryCommand::CreateLedgerEntry(create_cmd(
                id,
                dec!(-10),
                Decimal::ZERO,
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_two_sided_amounts() {
        let id = test_ledger_id();
        let ledger = GeneralLedgerEntry::empty(id);
        let err = ledger
            .handle(&LedgerEntryCommand::CreateLedgerEntry(create_cmd(
                id,
                dec!(10),
                dec!(10),
            )))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_requires_account_code() {
        let id = test_ledger_id();
        let ledger = GeneralLedgerEntry::empty(id);
        let mut cmd = create_cmd(id, dec!(10), Decimal::ZERO);
        cmd.account_code = "  ".to_string();
        let err = ledger
            .handle(&LedgerEntryCommand::CreateLedgerEntry(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn post_is_one_way() {
        let id = test_ledger_id();
        let mut ledger = GeneralLedgerEntry::empty(id);
        execute(
            &mut ledger,
            &LedgerEntryCommand::CreateLedgerEntry(create_cmd(id, dec!(100), Decimal::ZERO)),
        )
        .unwrap();

        let post = LedgerEntryCommand::PostLedgerEntry(PostLedgerEntry {
            ledger_id: id,
            posted_by: "closer".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut ledger, &post).unwrap();
        assert!(ledger.is_posted());
        assert_eq!(ledger.posted_by(), Some("closer"));

        let err = ledger.handle(&post).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_fails_unconditionally_once_posted() {
        let id = test_ledger_id();
        let mut ledger = GeneralLedgerEntry::empty(id);
        execute(
            &mut ledger,
            &LedgerEntryCommand::CreateLedgerEntry(create_cmd(id, dec!(100), Decimal::ZERO)),
        )
        .unwrap();
        execute(
            &mut ledger,
            &LedgerEntryCommand::PostLedgerEntry(PostLedgerEntry {
                ledger_id: id,
                posted_by: "closer".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        // Even a metadata-only change is refused after posting.
        let err = ledger
            .handle(&LedgerEntryCommand::UpdateLedgerEntry(UpdateLedgerEntry {
                ledger_id: id,
                debit: None,
                credit: None,
                memo: Some("late memo".to_string()),
                usoa_class: None,
                reference_number: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_before_posting_merges_fields() {
        let id = test_ledger_id();
        let mut ledger = GeneralLedgerEntry::empty(id);
        execute(
            &mut ledger,
            &LedgerEntryCommand::CreateLedgerEntry(create_cmd(id, dec!(100), Decimal::ZERO)),
        )
        .unwrap();

        execute(
            &mut ledger,
            &LedgerEntryCommand::UpdateLedgerEntry(UpdateLedgerEntry {
                ledger_id: id,
                debit: Some(dec!(150)),
                credit: None,
                memo: Some("adjusted".to_string()),
                usoa_class: None,
                reference_number: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        assert_eq!(ledger.debit(), dec!(150));
        assert_eq!(ledger.memo(), Some("adjusted"));
        assert_eq!(ledger.usoa_class(), Some("Distribution"));
    }

    #[test]
    fn no_change_update_emits_no_event() {
        let id = test_ledger_id();
        let mut ledger = GeneralLedgerEntry::empty(id);
        execute(
            &mut ledger,
            &LedgerEntryCommand::CreateLedgerEntry(create_cmd(id, dec!(100), Decimal::ZERO)),
        )
        .unwrap();

        let events = execute(
            &mut ledger,
            &LedgerEntryCommand::UpdateLedgerEntry(UpdateLedgerEntry {
                ledger_id: id,
                debit: None,
                credit: None,
                memo: None,
                usoa_class: None,
                reference_number: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(events.is_empty());
    }
}
