//! Account balances projection.
//!
//! Folds posted general-ledger events into per-account debit/credit running
//! totals: the consistent snapshot a trial balance is generated from.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use ledgerkit_core::{AccountId, AggregateId};
use ledgerkit_events::EventEnvelope;
use ledgerkit_ledger::LedgerEntryEvent;

/// Read model row: accumulated totals for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub account_code: String,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
}

impl AccountBalance {
    fn new(account_id: AccountId, account_code: String) -> Self {
        Self {
            account_id,
            account_code,
            debit_total: Decimal::ZERO,
            credit_total: Decimal::ZERO,
        }
    }

    /// Debits minus credits.
    pub fn net_balance(&self) -> Decimal {
        self.debit_total - self.credit_total
    }

    /// Present the net balance in trial-balance columns: a net debit lands
    /// in the debit column, a net credit in the credit column, never both.
    pub fn column_balances(&self) -> (Decimal, Decimal) {
        let net = self.net_balance();
        if net >= Decimal::ZERO {
            (net, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -net)
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-account balance projection over posted ledger entries.
///
/// Only `LedgerEntryPosted` moves balances: unposted ledger rows are not yet
/// authoritative. Duplicate deliveries are skipped via a per-stream cursor,
/// so the projection is safe under at-least-once delivery.
#[derive(Debug, Default)]
pub struct AccountBalances {
    balances: HashMap<String, AccountBalance>,
    cursors: HashMap<AggregateId, u64>,
}

impl AccountBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account_code: &str) -> Option<&AccountBalance> {
        self.balances.get(account_code)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// All balances, ordered by account code.
    pub fn sorted(&self) -> Vec<&AccountBalance> {
        let mut rows: Vec<&AccountBalance> = self.balances.values().collect();
        rows.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        rows
    }

    /// Apply one published envelope. Envelopes from other aggregate types
    /// and already-seen sequence numbers are ignored.
    pub fn apply_envelope(
        &mut self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != "ledger.entry" {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = self.cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate delivery; already applied.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: LedgerEntryEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let LedgerEntryEvent::LedgerEntryPosted(posted) = ev {
            let balance = self
                .balances
                .entry(posted.account_code.clone())
                .or_insert_with(|| {
                    AccountBalance::new(posted.account_id, posted.account_code.clone())
                });
            balance.debit_total += posted.debit;
            balance.credit_total += posted.credit;
        }

        self.cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn apply_all<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        for env in envelopes {
            self.apply_envelope(env)?;
        }
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<Self, ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid(), e.sequence_number()));

        let mut projection = Self::new();
        for env in &envs {
            projection.apply_envelope(env)?;
        }
        Ok(projection)
    }
}
