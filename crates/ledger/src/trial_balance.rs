use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use ledgerkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject};
use ledgerkit_events::{Command, Event};
use ledgerkit_period::PeriodId;

/// Penny-rounding tolerance for trial balance checks.
const ROUNDING_TOLERANCE: Decimal = dec!(0.01);

/// Trial balance identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialBalanceId(pub AggregateId);

impl TrialBalanceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TrialBalanceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// High-level account classification (determines rollup arithmetic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// Trial balance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialBalanceStatus {
    Draft,
    Finalized,
}

/// One account's balance row in the trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceLineItem {
    account_code: String,
    account_name: String,
    account_type: AccountType,
    debit_balance: Decimal,
    credit_balance: Decimal,
}

impl TrialBalanceLineItem {
    pub fn new(
        account_code: impl Into<String>,
        account_name: impl Into<String>,
        account_type: AccountType,
        debit_balance: Decimal,
        credit_balance: Decimal,
    ) -> Result<Self, DomainError> {
        let account_code = account_code.into();
        if account_code.trim().is_empty() {
            return Err(DomainError::validation("account code is required"));
        }
        if debit_balance < Decimal::ZERO || credit_balance < Decimal::ZERO {
            return Err(DomainError::validation("balances cannot be negative"));
        }

        Ok(Self {
            account_code: account_code.trim().to_string(),
            account_name: account_name.into().trim().to_string(),
            account_type,
            debit_balance,
            credit_balance,
        })
    }

    pub fn account_code(&self) -> &str {
        &self.account_code
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn debit_balance(&self) -> Decimal {
        self.debit_balance
    }

    pub fn credit_balance(&self) -> Decimal {
        self.credit_balance
    }

    pub fn net_balance(&self) -> Decimal {
        self.debit_balance - self.credit_balance
    }
}

impl ValueObject for TrialBalanceLineItem {}

/// Derived column totals and per-type rollups, recomputed on every line-item
/// addition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceTotals {
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub out_of_balance_amount: Decimal,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub account_count: usize,
}

impl TrialBalanceTotals {
    /// Full O(n) recomputation over the line items; acceptable at the
    /// expected account-count scale (hundreds, not millions).
    pub fn recalculate(items: &[TrialBalanceLineItem]) -> Self {
        let mut totals = Self::default();
        for item in items {
            totals.total_debits += item.debit_balance;
            totals.total_credits += item.credit_balance;
            match item.account_type {
                AccountType::Asset => totals.total_assets += item.net_balance(),
                AccountType::Liability => totals.total_liabilities += -item.net_balance(),
                AccountType::Equity => totals.total_equity += -item.net_balance(),
                AccountType::Revenue => totals.total_revenue += item.credit_balance,
                AccountType::Expense => totals.total_expenses += item.debit_balance,
            }
        }
        totals.out_of_balance_amount = (totals.total_debits - totals.total_credits).abs();
        totals.account_count = items.len();
        totals
    }

    pub fn is_balanced(&self) -> bool {
        self.out_of_balance_amount < ROUNDING_TOLERANCE
    }

    pub fn net_income(&self) -> Decimal {
        self.total_revenue - self.total_expenses
    }

    /// Assets = Liabilities + Equity, within the rounding tolerance.
    pub fn accounting_equation_balances(&self) -> bool {
        let difference = self.total_assets - (self.total_liabilities + self.total_equity);
        difference.abs() <= ROUNDING_TOLERANCE
    }
}

impl ValueObject for TrialBalanceTotals {}

/// Aggregate root: TrialBalance.
///
/// A point-in-time snapshot aggregating ledger balances per account into
/// debit/credit columns with per-type rollups. `Finalize` is a one-way gate
/// requiring both balance equality and the accounting equation; `Reopen`
/// reverses it with a mandatory reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialBalance {
    id: TrialBalanceId,
    number: String,
    period_id: PeriodId,
    period_start: NaiveDate,
    period_end: NaiveDate,
    include_zero_balances: bool,
    description: Option<String>,
    notes: Option<String>,
    status: TrialBalanceStatus,
    line_items: Vec<TrialBalanceLineItem>,
    totals: TrialBalanceTotals,
    finalized_by: Option<String>,
    finalized_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl TrialBalance {
    /// Empty aggregate for rehydration.
    pub fn empty(id: TrialBalanceId) -> Self {
        Self {
            id,
            number: String::new(),
            period_id: PeriodId::new(AggregateId::from_uuid(uuid::Uuid::nil())),
            period_start: NaiveDate::MIN,
            period_end: NaiveDate::MAX,
            include_zero_balances: false,
            description: None,
            notes: None,
            status: TrialBalanceStatus::Draft,
            line_items: Vec::new(),
            totals: TrialBalanceTotals::default(),
            finalized_by: None,
            finalized_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TrialBalanceId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn period_id(&self) -> PeriodId {
        self.period_id
    }

    pub fn period_start(&self) -> NaiveDate {
        self.period_start
    }

    pub fn period_end(&self) -> NaiveDate {
        self.period_end
    }

    pub fn include_zero_balances(&self) -> bool {
        self.include_zero_balances
    }

    pub fn status(&self) -> TrialBalanceStatus {
        self.status
    }

    pub fn line_items(&self) -> &[TrialBalanceLineItem] {
        &self.line_items
    }

    pub fn totals(&self) -> &TrialBalanceTotals {
        &self.totals
    }

    pub fn total_debits(&self) -> Decimal {
        self.totals.total_debits
    }

    pub fn total_credits(&self) -> Decimal {
        self.totals.total_credits
    }

    pub fn out_of_balance_amount(&self) -> Decimal {
        self.totals.out_of_balance_amount
    }

    pub fn is_balanced(&self) -> bool {
        self.totals.is_balanced()
    }

    pub fn net_income(&self) -> Decimal {
        self.totals.net_income()
    }

    pub fn accounting_equation_balances(&self) -> bool {
        self.totals.accounting_equation_balances()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn finalized_by(&self) -> Option<&str> {
        self.finalized_by.as_deref()
    }
}

impl AggregateRoot for TrialBalance {
    type Id = TrialBalanceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTrialBalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTrialBalance {
    pub trial_balance_id: TrialBalanceId,
    pub number: String,
    pub period_id: PeriodId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub include_zero_balances: bool,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLineItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLineItem {
    pub trial_balance_id: TrialBalanceId,
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub debit_balance: Decimal,
    pub credit_balance: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FinalizeTrialBalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeTrialBalance {
    pub trial_balance_id: TrialBalanceId,
    pub finalized_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenTrialBalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenTrialBalance {
    pub trial_balance_id: TrialBalanceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialBalanceCommand {
    CreateTrialBalance(CreateTrialBalance),
    AddLineItem(AddLineItem),
    FinalizeTrialBalance(FinalizeTrialBalance),
    ReopenTrialBalance(ReopenTrialBalance),
}

impl Command for TrialBalanceCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            TrialBalanceCommand::CreateTrialBalance(c) => c.trial_balance_id.0,
            TrialBalanceCommand::AddLineItem(c) => c.trial_balance_id.0,
            TrialBalanceCommand::FinalizeTrialBalance(c) => c.trial_balance_id.0,
            TrialBalanceCommand::ReopenTrialBalance(c) => c.trial_balance_id.0,
        }
    }
}

/// Event: TrialBalanceCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceCreated {
    pub trial_balance_id: TrialBalanceId,
    pub number: String,
    pub period_id: PeriodId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub include_zero_balances: bool,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrialBalanceLineItemAdded.
///
/// Carries the recalculated totals alongside the new row, so the event
/// doubles as the "recalculated" notification for downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceLineItemAdded {
    pub trial_balance_id: TrialBalanceId,
    pub number: String,
    pub line_item: TrialBalanceLineItem,
    pub totals: TrialBalanceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrialBalanceFinalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceFinalized {
    pub trial_balance_id: TrialBalanceId,
    pub number: String,
    pub finalized_by: String,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrialBalanceReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceReopened {
    pub trial_balance_id: TrialBalanceId,
    pub number: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialBalanceEvent {
    TrialBalanceCreated(TrialBalanceCreated),
    TrialBalanceLineItemAdded(TrialBalanceLineItemAdded),
    TrialBalanceFinalized(TrialBalanceFinalized),
    TrialBalanceReopened(TrialBalanceReopened),
}

impl Event for TrialBalanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TrialBalanceEvent::TrialBalanceCreated(_) => "ledger.trial_balance.created",
            TrialBalanceEvent::TrialBalanceLineItemAdded(_) => {
                "ledger.trial_balance.line_item_added"
            }
            TrialBalanceEvent::TrialBalanceFinalized(_) => "ledger.trial_balance.finalized",
            TrialBalanceEvent::TrialBalanceReopened(_) => "ledger.trial_balance.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TrialBalanceEvent::TrialBalanceCreated(e) => e.occurred_at,
            TrialBalanceEvent::TrialBalanceLineItemAdded(e) => e.occurred_at,
            TrialBalanceEvent::TrialBalanceFinalized(e) => e.occurred_at,
            TrialBalanceEvent::TrialBalanceReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TrialBalance {
    type Command = TrialBalanceCommand;
    type Event = TrialBalanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TrialBalanceEvent::TrialBalanceCreated(e) => {
                self.id = e.trial_balance_id;
                self.number = e.number.clone();
                self.period_id = e.period_id;
                self.period_start = e.period_start;
                self.period_end = e.period_end;
                self.include_zero_balances = e.include_zero_balances;
                self.description = e.description.clone();
                self.notes = e.notes.clone();
                self.status = TrialBalanceStatus::Draft;
                self.line_items.clear();
                self.totals = TrialBalanceTotals::default();
                self.created = true;
            }
            TrialBalanceEvent::TrialBalanceLineItemAdded(e) => {
                self.line_items.push(e.line_item.clone());
                self.totals = e.totals.clone();
            }
            TrialBalanceEvent::TrialBalanceFinalized(e) => {
                self.status = TrialBalanceStatus::Finalized;
                self.finalized_by = Some(e.finalized_by.clone());
                self.finalized_at = Some(e.occurred_at);
            }
            TrialBalanceEvent::TrialBalanceReopened(e) => {
                self.status = TrialBalanceStatus::Draft;
                self.finalized_by = None;
                self.finalized_at = None;
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
            TrialBalanceCommand::CreateTrialBalance(cmd) => self.handle_create(cmd),
            TrialBalanceCommand::AddLineItem(cmd) => self.handle_add_line_item(cmd),
            TrialBalanceCommand::FinalizeTrialBalance(cmd) => self.handle_finalize(cmd),
            TrialBalanceCommand::ReopenTrialBalance(cmd) => self.handle_reopen(cmd),
        }
    }
}

impl TrialBalance {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateTrialBalance) -> Result<Vec<TrialBalanceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("trial balance already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("trial balance number is required"));
        }
        if cmd.period_start >= cmd.period_end {
            return Err(DomainError::validation(
                "period start date must be before end date",
            ));
        }

        Ok(vec![TrialBalanceEvent::TrialBalanceCreated(
            TrialBalanceCreated {
                trial_balance_id: cmd.trial_balance_id,
                number: cmd.number.trim().to_string(),
                period_id: cmd.period_id,
                period_start: cmd.period_start,
                period_end: cmd.period_end,
                include_zero_balances: cmd.include_zero_balances,
                description: cmd
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                notes: cmd
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line_item(&self, cmd: &AddLineItem) -> Result<Vec<TrialBalanceEvent>, DomainError> {
        self.ensure_created()?;
        if self.status == TrialBalanceStatus::Finalized {
            return Err(DomainError::conflict("cannot modify finalized trial balance"));
        }

        // Zero-balance accounts are silently skipped unless requested.
        if !self.include_zero_balances
            && cmd.debit_balance == Decimal::ZERO
            && cmd.credit_balance == Decimal::ZERO
        {
            return Ok(vec![]);
        }

        let line_item = TrialBalanceLineItem::new(
            cmd.account_code.clone(),
            cmd.account_name.clone(),
            cmd.account_type,
            cmd.debit_balance,
            cmd.credit_balance,
        )?;

        // Prospective totals including the new row; `apply` installs them.
        let mut items = self.line_items.clone();
        items.push(line_item.clone());
        let totals = TrialBalanceTotals::recalculate(&items);

        Ok(vec![TrialBalanceEvent::TrialBalanceLineItemAdded(
            TrialBalanceLineItemAdded {
                trial_balance_id: cmd.trial_balance_id,
                number: self.number.clone(),
                line_item,
                totals,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_finalize(
        &self,
        cmd: &FinalizeTrialBalance,
    ) -> Result<Vec<TrialBalanceEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.finalized_by.trim().is_empty() {
            return Err(DomainError::validation("finalizer information is required"));
        }
        if self.status == TrialBalanceStatus::Finalized {
            return Err(DomainError::conflict("trial balance is already finalized"));
        }
        if !self.is_balanced() {
            return Err(DomainError::invariant(format!(
                "cannot finalize unbalanced trial balance (out of balance by {})",
                self.out_of_balance_amount()
            )));
        }
        if !self.accounting_equation_balances() {
            return Err(DomainError::invariant(format!(
                "accounting equation does not balance: assets ({}) != liabilities ({}) + equity ({})",
                self.totals.total_assets, self.totals.total_liabilities, self.totals.total_equity
            )));
        }

        Ok(vec![TrialBalanceEvent::TrialBalanceFinalized(
            TrialBalanceFinalized {
                trial_balance_id: cmd.trial_balance_id,
                number: self.number.clone(),
                finalized_by: cmd.finalized_by.trim().to_string(),
                total_debits: self.total_debits(),
                total_credits: self.total_credits(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reopen(&self, cmd: &ReopenTrialBalance) -> Result<Vec<TrialBalanceEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason is required to reopen"));
        }
        if self.status != TrialBalanceStatus::Finalized {
            return Err(DomainError::conflict(
                "can only reopen a finalized trial balance",
            ));
        }

        Ok(vec![TrialBalanceEvent::TrialBalanceReopened(
            TrialBalanceReopened {
                trial_balance_id: cmd.trial_balance_id,
                number: self.number.clone(),
                reason: cmd.reason.trim().to_string(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkit_events::execute;

    fn test_tb_id() -> TrialBalanceId {
        TrialBalanceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn created_tb(id: TrialBalanceId, include_zero_balances: bool) -> TrialBalance {
        let mut tb = TrialBalance::empty(id);
        execute(
            &mut tb,
            &TrialBalanceCommand::CreateTrialBalance(CreateTrialBalance {
                trial_balance_id: id,
                number: "TB-2025-10".to_string(),
                period_id: PeriodId::new(AggregateId::new()),
                period_start: date(2025, 10, 1),
                period_end: date(2025, 10, 31),
                include_zero_balances,
                description: None,
                notes: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        tb
    }

    fn add_item(
        tb: &mut TrialBalance,
        code: &str,
        kind: AccountType,
        debit: Decimal,
        credit: Decimal,
    ) -> Vec<TrialBalanceEvent> {
        let id = tb.id_typed();
        execute(
            tb,
            &TrialBalanceCommand::AddLineItem(AddLineItem {
                trial_balance_id: id,
                account_code: code.to_string(),
                account_name: code.to_string(),
                account_type: kind,
                debit_balance: debit,
                credit_balance: credit,
                occurred_at: test_time(),
            }),
        )
        .unwrap()
    }

    fn finalize_cmd(id: TrialBalanceId) -> TrialBalanceCommand {
        TrialBalanceCommand::FinalizeTrialBalance(FinalizeTrialBalance {
            trial_balance_id: id,
            finalized_by: "controller".to_string(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn balanced_trial_balance_finalizes() {
        // Asset 5000 debit, Liability 2000 credit, Equity 3000 credit.
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "1000", AccountType::Asset, dec!(5000), Decimal::ZERO);
        add_item(&mut tb, "2000", AccountType::Liability, Decimal::ZERO, dec!(2000));
        add_item(&mut tb, "3000", AccountType::Equity, Decimal::ZERO, dec!(3000));

        assert!(tb.is_balanced());
        assert_eq!(tb.totals().total_assets, dec!(5000));
        assert_eq!(tb.totals().total_liabilities, dec!(2000));
        assert_eq!(tb.totals().total_equity, dec!(3000));
        assert!(tb.accounting_equation_balances());

        execute(&mut tb, &finalize_cmd(id)).unwrap();
        assert_eq!(tb.status(), TrialBalanceStatus::Finalized);
        assert_eq!(tb.finalized_by(), Some("controller"));
    }

    #[test]
    fn out_of_balance_trial_balance_cannot_finalize() {
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "1000", AccountType::Asset, dec!(5000), Decimal::ZERO);
        add_item(&mut tb, "2000", AccountType::Liability, Decimal::ZERO, dec!(4000));

        assert!(!tb.is_balanced());
        assert_eq!(tb.out_of_balance_amount(), dec!(1000));

        let err = tb.handle(&finalize_cmd(id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(tb.status(), TrialBalanceStatus::Draft);
    }

    #[test]
    fn balanced_but_equation_violating_cannot_finalize() {
        // Debits equal credits, but Assets != Liabilities + Equity.
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "1000", AccountType::Asset, dec!(5000), Decimal::ZERO);
        add_item(&mut tb, "4000", AccountType::Revenue, Decimal::ZERO, dec!(5000));

        assert!(tb.is_balanced());
        assert!(!tb.accounting_equation_balances());

        let err = tb.handle(&finalize_cmd(id)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn zero_balance_rows_skipped_unless_requested() {
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        let events = add_item(&mut tb, "1000", AccountType::Asset, Decimal::ZERO, Decimal::ZERO);
        assert!(events.is_empty());
        assert_eq!(tb.line_items().len(), 0);

        let id = test_tb_id();
        let mut tb = created_tb(id, true);
        let events = add_item(&mut tb, "1000", AccountType::Asset, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(events.len(), 1);
        assert_eq!(tb.line_items().len(), 1);
    }

    #[test]
    fn negative_balances_are_rejected() {
        let id = test_tb_id();
        let tb = created_tb(id, false);
        let err = tb
            .handle(&TrialBalanceCommand::AddLineItem(AddLineItem {
                trial_balance_id: id,
                account_code: "1000".to_string(),
                account_name: "Cash".to_string(),
                account_type: AccountType::Asset,
                debit_balance: dec!(-1),
                credit_balance: Decimal::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn finalized_trial_balance_rejects_line_items() {
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "1000", AccountType::Asset, dec!(100), Decimal::ZERO);
        add_item(&mut tb, "3000", AccountType::Equity, Decimal::ZERO, dec!(100));
        execute(&mut tb, &finalize_cmd(id)).unwrap();

        let err = tb
            .handle(&TrialBalanceCommand::AddLineItem(AddLineItem {
                trial_balance_id: id,
                account_code: "5000".to_string(),
                account_name: "Late".to_string(),
                account_type: AccountType::Expense,
                debit_balance: dec!(10),
                credit_balance: Decimal::ZERO,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        // Double finalize is a conflict as well.
        let err = tb.handle(&finalize_cmd(id)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reopen_requires_reason_and_returns_to_draft() {
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "1000", AccountType::Asset, dec!(100), Decimal::ZERO);
        add_item(&mut tb, "3000", AccountType::Equity, Decimal::ZERO, dec!(100));
        execute(&mut tb, &finalize_cmd(id)).unwrap();

        let err = tb
            .handle(&TrialBalanceCommand::ReopenTrialBalance(ReopenTrialBalance {
                trial_balance_id: id,
                reason: "  ".to_string(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        execute(
            &mut tb,
            &TrialBalanceCommand::ReopenTrialBalance(ReopenTrialBalance {
                trial_balance_id: id,
                reason: "adjusting entries pending".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(tb.status(), TrialBalanceStatus::Draft);
        assert!(tb.notes().unwrap().contains("adjusting entries pending"));

        // Draft again: adding rows works.
        add_item(&mut tb, "5000", AccountType::Expense, dec!(50), Decimal::ZERO);
        assert_eq!(tb.line_items().len(), 3);
    }

    #[test]
    fn revenue_and_expense_rollups_feed_net_income() {
        let id = test_tb_id();
        let mut tb = created_tb(id, false);
        add_item(&mut tb, "4000", AccountType::Revenue, Decimal::ZERO, dec!(900));
        add_item(&mut tb, "5000", AccountType::Expense, dec!(600), Decimal::ZERO);

        assert_eq!(tb.totals().total_revenue, dec!(900));
        assert_eq!(tb.totals().total_expenses, dec!(600));
        assert_eq!(tb.net_income(), dec!(300));
    }
}
