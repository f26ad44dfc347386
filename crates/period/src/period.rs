use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledgerkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use ledgerkit_events::{Command, Event};

const MAX_NAME_LEN: usize = 256;
const MIN_FISCAL_YEAR: i32 = 1900;
const MAX_FISCAL_YEAR: i32 = 2100;

/// Accounting period identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodId(pub AggregateId);

impl PeriodId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PeriodId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Period granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Yearly,
}

/// Aggregate root: AccountingPeriod.
///
/// The time-boundary gate: journal entries, trial balances and period closes
/// reference a period by id; the orchestration layer queries `is_closed` and
/// `is_date_in_period` before allowing postings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingPeriod {
    id: PeriodId,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    fiscal_year: i32,
    period_type: PeriodType,
    is_adjustment_period: bool,
    is_closed: bool,
    version: u64,
    created: bool,
}

impl AccountingPeriod {
    /// Empty aggregate for rehydration.
    pub fn empty(id: PeriodId) -> Self {
        Self {
            id,
            name: String::new(),
            start_date: NaiveDate::MIN,
            end_date: NaiveDate::MAX,
            fiscal_year: 0,
            period_type: PeriodType::Monthly,
            is_adjustment_period: false,
            is_closed: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PeriodId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn fiscal_year(&self) -> i32 {
        self.fiscal_year
    }

    pub fn period_type(&self) -> PeriodType {
        self.period_type
    }

    pub fn is_adjustment_period(&self) -> bool {
        self.is_adjustment_period
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// Inclusive range check used by the posting orchestrator to validate
    /// that a journal entry's date falls within this period.
    pub fn is_date_in_period(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

impl AggregateRoot for AccountingPeriod {
    type Id = PeriodId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePeriod {
    pub period_id: PeriodId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fiscal_year: i32,
    pub period_type: PeriodType,
    pub is_adjustment_period: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePeriod. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePeriod {
    pub period_id: PeriodId,
    pub name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub fiscal_year: Option<i32>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ClosePeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePeriod {
    pub period_id: PeriodId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenPeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenPeriod {
    pub period_id: PeriodId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodCommand {
    CreatePeriod(CreatePeriod),
    UpdatePeriod(UpdatePeriod),
    ClosePeriod(ClosePeriod),
    ReopenPeriod(ReopenPeriod),
}

impl Command for PeriodCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        match self {
            PeriodCommand::CreatePeriod(c) => c.period_id.0,
            PeriodCommand::UpdatePeriod(c) => c.period_id.0,
            PeriodCommand::ClosePeriod(c) => c.period_id.0,
            PeriodCommand::ReopenPeriod(c) => c.period_id.0,
        }
    }
}

/// Event: PeriodCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCreated {
    pub period_id: PeriodId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fiscal_year: i32,
    pub period_type: PeriodType,
    pub is_adjustment_period: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodUpdated. Carries the merged field values after the update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodUpdated {
    pub period_id: PeriodId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fiscal_year: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodClosed {
    pub period_id: PeriodId,
    pub name: String,
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PeriodReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodReopened {
    pub period_id: PeriodId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodEvent {
    PeriodCreated(PeriodCreated),
    PeriodUpdated(PeriodUpdated),
    PeriodClosed(PeriodClosed),
    PeriodReopened(PeriodReopened),
}

impl Event for PeriodEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PeriodEvent::PeriodCreated(_) => "accounting.period.created",
            PeriodEvent::PeriodUpdated(_) => "accounting.period.updated",
            PeriodEvent::PeriodClosed(_) => "accounting.period.closed",
            PeriodEvent::PeriodReopened(_) => "accounting.period.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PeriodEvent::PeriodCreated(e) => e.occurred_at,
            PeriodEvent::PeriodUpdated(e) => e.occurred_at,
            PeriodEvent::PeriodClosed(e) => e.occurred_at,
            PeriodEvent::PeriodReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AccountingPeriod {
    type Command = PeriodCommand;
    type Event = PeriodEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PeriodEvent::PeriodCreated(e) => {
                self.id = e.period_id;
                self.name = e.name.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.fiscal_year = e.fiscal_year;
                self.period_type = e.period_type;
                self.is_adjustment_period = e.is_adjustment_period;
                self.is_closed = false;
                self.created = true;
            }
            PeriodEvent::PeriodUpdated(e) => {
                self.name = e.name.clone();
                self.start_date = e.start_date;
                self.end_date = e.end_date;
                self.fiscal_year = e.fiscal_year;
            }
            PeriodEvent::PeriodClosed(_) => {
                self.is_closed = true;
            }
            PeriodEvent::PeriodReopened(_) => {
                self.is_closed = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PeriodCommand::CreatePeriod(cmd) => self.handle_create(cmd),
            PeriodCommand::UpdatePeriod(cmd) => self.handle_update(cmd),
            PeriodCommand::ClosePeriod(cmd) => self.handle_close(cmd),
            PeriodCommand::ReopenPeriod(cmd) => self.handle_reopen(cmd),
        }
    }
}

impl AccountingPeriod {
    fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), DomainError> {
        if start >= end {
            return Err(DomainError::validation(
                "period start date must be before end date",
            ));
        }
        Ok(())
    }

    fn validate_fiscal_year(year: i32) -> Result<(), DomainError> {
        if !(MIN_FISCAL_YEAR..=MAX_FISCAL_YEAR).contains(&year) {
            return Err(DomainError::validation(format!(
                "fiscal year {year} out of range ({MIN_FISCAL_YEAR}-{MAX_FISCAL_YEAR})"
            )));
        }
        Ok(())
    }

    fn validate_name(name: &str) -> Result<String, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("period name is required"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "period name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }
        Ok(name.to_string())
    }

    fn handle_create(&self, cmd: &CreatePeriod) -> Result<Vec<PeriodEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("accounting period already exists"));
        }

        let name = Self::validate_name(&cmd.name)?;
        Self::validate_range(cmd.start_date, cmd.end_date)?;
        Self::validate_fiscal_year(cmd.fiscal_year)?;

        Ok(vec![PeriodEvent::PeriodCreated(PeriodCreated {
            period_id: cmd.period_id,
            name,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            fiscal_year: cmd.fiscal_year,
            period_type: cmd.period_type,
            is_adjustment_period: cmd.is_adjustment_period,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePeriod) -> Result<Vec<PeriodEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.is_closed {
            return Err(DomainError::conflict("cannot modify a closed period"));
        }

        let name = match &cmd.name {
            Some(n) => Self::validate_name(n)?,
            None => self.name.clone(),
        };
        let start_date = cmd.start_date.unwrap_or(self.start_date);
        let end_date = cmd.end_date.unwrap_or(self.end_date);
        Self::validate_range(start_date, end_date)?;
        let fiscal_year = cmd.fiscal_year.unwrap_or(self.fiscal_year);
        Self::validate_fiscal_year(fiscal_year)?;

        // No-change updates emit nothing.
        if name == self.name
            && start_date == self.start_date
            && end_date == self.end_date
            && fiscal_year == self.fiscal_year
        {
            return Ok(vec![]);
        }

        Ok(vec![PeriodEvent::PeriodUpdated(PeriodUpdated {
            period_id: cmd.period_id,
            name,
            start_date,
            end_date,
            fiscal_year,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &ClosePeriod) -> Result<Vec<PeriodEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.is_closed {
            return Err(DomainError::conflict("period is already closed"));
        }

        Ok(vec![PeriodEvent::PeriodClosed(PeriodClosed {
            period_id: cmd.period_id,
            name: self.name.clone(),
            end_date: self.end_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenPeriod) -> Result<Vec<PeriodEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.is_closed {
            return Err(DomainError::conflict("period is not closed"));
        }

        Ok(vec![PeriodEvent::PeriodReopened(PeriodReopened {
            period_id: cmd.period_id,
            name: self.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerkit_events::execute;

    fn test_period_id() -> PeriodId {
        PeriodId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn september(period_id: PeriodId) -> CreatePeriod {
        CreatePeriod {
            period_id,
            name: "2025-09".to_string(),
            start_date: date(2025, 9, 1),
            end_date: date(2025, 9, 30),
            fiscal_year: 2025,
            period_type: PeriodType::Monthly,
            is_adjustment_period: false,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn create_validates_and_emits_event() {
        let id = test_period_id();
        let mut period = AccountingPeriod::empty(id);

        let events = execute(&mut period, &PeriodCommand::CreatePeriod(september(id))).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(period.name(), "2025-09");
        assert!(!period.is_closed());
        assert_eq!(period.version(), 1);
    }

    #[test]
    fn create_rejects_inverted_date_range() {
        let id = test_period_id();
        let period = AccountingPeriod::empty(id);

        let mut cmd = september(id);
        cmd.start_date = date(2025, 10, 1);
        let err = period.handle(&PeriodCommand::CreatePeriod(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_rejects_out_of_range_fiscal_year() {
        let id = test_period_id();
        let period = AccountingPeriod::empty(id);

        let mut cmd = september(id);
        cmd.fiscal_year = 1805;
        let err = period.handle(&PeriodCommand::CreatePeriod(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn date_in_period_is_inclusive_of_both_boundaries() {
        let id = test_period_id();
        let mut period = AccountingPeriod::empty(id);
        execute(&mut period, &PeriodCommand::CreatePeriod(september(id))).unwrap();

        assert!(period.is_date_in_period(date(2025, 9, 1)));
        assert!(period.is_date_in_period(date(2025, 9, 30)));
        assert!(period.is_date_in_period(date(2025, 9, 15)));
        assert!(!period.is_date_in_period(date(2025, 8, 31)));
        assert!(!period.is_date_in_period(date(2025, 10, 1)));
    }

    #[test]
    fn close_is_one_way_until_reopened() {
        let id = test_period_id();
        let mut period = AccountingPeriod::empty(id);
        execute(&mut period, &PeriodCommand::CreatePeriod(september(id))).unwrap();

        let close = PeriodCommand::ClosePeriod(ClosePeriod {
            period_id: id,
            occurred_at: test_time(),
        });
        execute(&mut period, &close).unwrap();
        assert!(period.is_closed());

        // Redundant close is rejected.
        let err = period.handle(&close).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let reopen = PeriodCommand::ReopenPeriod(ReopenPeriod {
            period_id: id,
            occurred_at: test_time(),
        });
        execute(&mut period, &reopen).unwrap();
        assert!(!period.is_closed());

        // Redundant reopen is rejected too.
        let err = period.handle(&reopen).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_is_rejected_once_closed() {
        let id = test_period_id();
        let mut period = AccountingPeriod::empty(id);
        execute(&mut period, &PeriodCommand::CreatePeriod(september(id))).unwrap();
        execute(
            &mut period,
            &PeriodCommand::ClosePeriod(ClosePeriod {
                period_id: id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = period
            .handle(&PeriodCommand::UpdatePeriod(UpdatePeriod {
                period_id: id,
                name: Some("renamed".to_string()),
                start_date: None,
                end_date: None,
                fiscal_year: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn no_change_update_emits_no_event() {
        let id = test_period_id();
        let mut period = AccountingPeriod::empty(id);
        execute(&mut period, &PeriodCommand::CreatePeriod(september(id))).unwrap();

        let events = execute(
            &mut period,
            &PeriodCommand::UpdatePeriod(UpdatePeriod {
                period_id: id,
                name: None,
                start_date: None,
                end_date: None,
                fiscal_year: None,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(events.is_empty());
        assert_eq!(period.version(), 1);
    }
}
