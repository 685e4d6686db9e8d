//! Reconciliation engine
//!
//! Full outer join of a broker snapshot against the currently rendered
//! ledger rows, on the join key, classifying every joined row into exactly
//! one action. The broker is the source of truth; the ledger is the target.
//!
//! Deletion is never an outcome. A ledger row the broker no longer reports
//! is zeroed out instead, preserving the row, its identity and its cost
//! basis. The target system delete is irreversible and would discard the
//! historical performance of closed positions, expired options and emptied
//! accounts. This is a hard invariant, not a tunable default.

use crate::domain::entities::broker_record::BrokerRecord;
use crate::domain::entities::ledger_record::LedgerRecord;
use std::collections::HashMap;

/// The action reconciliation assigns to one joined row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// Present on both sides with equal values; nothing to do.
    Unchanged,
    /// Present on both sides with differing values; update the value only.
    Modify,
    /// Present in the ledger only (or broker value absent); zero the value,
    /// keep the row, its name and its cost basis.
    ModifyToZero,
    /// Present in the broker snapshot only; create a ledger row.
    Add,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SyncAction::Unchanged => "UNCHANGED",
            SyncAction::Modify => "MODIFY",
            SyncAction::ModifyToZero => "MODIFY_TO_ZERO",
            SyncAction::Add => "ADD",
        };
        write!(f, "{}", label)
    }
}

/// One row of the outer join. At least one side is always present.
#[derive(Debug, Clone)]
pub struct ReconciledRow {
    pub join_key: String,
    pub broker: Option<BrokerRecord>,
    pub ledger: Option<LedgerRecord>,
    pub action: SyncAction,
}

/// Join broker rows against ledger rows and classify each result.
///
/// Every join key present on either side appears exactly once in the
/// output: ledger rows first in scrape order, then broker-only rows in
/// report order. Classification is a pure function of the two snapshots,
/// so rerunning on identical inputs yields identical actions.
pub fn reconcile(
    broker_rows: Vec<BrokerRecord>,
    ledger_rows: Vec<LedgerRecord>,
) -> Vec<ReconciledRow> {
    let mut broker_slots: Vec<Option<BrokerRecord>> = broker_rows.into_iter().map(Some).collect();
    let mut broker_index: HashMap<String, usize> = HashMap::new();
    for (idx, slot) in broker_slots.iter().enumerate() {
        if let Some(record) = slot {
            // First occurrence wins; the normalizer already aggregated
            // duplicates, so collisions cannot occur here.
            broker_index.entry(record.join_key.clone()).or_insert(idx);
        }
    }

    let mut rows = Vec::with_capacity(broker_slots.len() + ledger_rows.len());

    for ledger in ledger_rows {
        let broker = broker_index
            .get(&ledger.join_key)
            .and_then(|&idx| broker_slots[idx].take());
        let action = classify(broker.as_ref(), &ledger);
        rows.push(ReconciledRow {
            join_key: ledger.join_key.clone(),
            broker,
            ledger: Some(ledger),
            action,
        });
    }

    for slot in broker_slots {
        if let Some(broker) = slot {
            rows.push(ReconciledRow {
                join_key: broker.join_key.clone(),
                broker: Some(broker),
                ledger: None,
                action: SyncAction::Add,
            });
        }
    }

    rows
}

/// Classify a ledger row against its (possibly absent) broker counterpart.
///
/// Equality is on the converted integer-yen value. An absent broker value
/// is unequal to every concrete value and classifies as zero-out, never as
/// a modify to some guessed number.
fn classify(broker: Option<&BrokerRecord>, ledger: &LedgerRecord) -> SyncAction {
    match broker.and_then(|b| b.value_jpy) {
        Some(broker_value) if ledger.value_jpy == Some(broker_value) => SyncAction::Unchanged,
        Some(_) => SyncAction::Modify,
        None => SyncAction::ModifyToZero,
    }
}
