//! Ledger-side rows scraped from the target application's asset tables

/// The two manual-asset tables the sync operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerTable {
    /// Deposits / cash / crypto table, joined on currency.
    CashDeposits,
    /// Equity table (stocks and derivatives), joined on the position key.
    Equities,
}

impl LedgerTable {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerTable::CashDeposits => "cash-deposits",
            LedgerTable::Equities => "equities",
        }
    }
}

impl std::fmt::Display for LedgerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One row currently rendered in a ledger table.
///
/// `row_position` is only meaningful within the page snapshot it was scraped
/// from; every mutation can shift positions, so it is never cached across
/// actuations. `asset_id` is the stable identifier the target system assigns
/// and is what update/delete operations address.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// 1-based position in the rendered table at scrape time.
    pub row_position: usize,
    /// Stable identifier assigned by the target system.
    pub asset_id: String,
    /// Natural key the reconciliation joins on (currency or position key).
    pub join_key: String,
    /// The display name as currently rendered; preserved when zeroing out.
    pub display_name: Option<String>,
    /// Current value in reporting currency, parsed from localized text.
    pub value_jpy: Option<i64>,
}
