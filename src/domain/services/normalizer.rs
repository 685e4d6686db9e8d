//! Row normalization
//!
//! Adapts the two raw row shapes (broker attribute records and scraped
//! ledger cells) into `BrokerRecord` / `LedgerRecord` keyed for the join.
//! Missing or unparsable numerics become `None` with a diagnostic, never a
//! silent zero: the reconciliation must be able to tell "value not
//! reported" apart from "value is zero".
//!
//! Duplicate join keys within one snapshot are aggregated (values summed)
//! so the outer join stays 1:1; option contracts are disambiguated by
//! deriving the position key from the display name minus its quantity
//! suffix, which both sides of the join can compute identically.

use crate::domain::entities::broker_record::{BrokerRecord, InstrumentCategory, OptionSide};
use crate::domain::entities::ledger_record::{LedgerRecord, LedgerTable};
use crate::domain::repositories::ledger_gateway::ScrapedRow;
use crate::domain::repositories::report_source::RawRecord;
use crate::domain::services::name_formatter::{format_asset_name, strip_quantity_suffix};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Column headers of the ledger tables.
const CASH_NAME_HEADER: &str = "種類・名称";
const CASH_VALUE_HEADER: &str = "残高";
const EQUITY_NAME_HEADER: &str = "銘柄名";
const EQUITY_VALUE_HEADER: &str = "評価額";

/// Positions report normalized, with the categories that were dropped.
#[derive(Debug, Clone, Default)]
pub struct NormalizedPositions {
    pub records: Vec<BrokerRecord>,
    /// Category code of every dropped row, surfaced to the orchestrator.
    pub unsupported: Vec<String>,
}

/// Normalize cash-report rows; join key is the currency.
pub fn normalize_cash_report(rows: &[RawRecord]) -> Vec<BrokerRecord> {
    let mut records: Vec<BrokerRecord> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let currency = match non_empty(row.get("currency")) {
            Some(currency) => currency,
            None => {
                debug!("cash row without a currency attribute skipped");
                continue;
            }
        };
        let amount = parse_decimal(row.get("endingCash"));
        if amount.is_none() {
            debug!(currency = %currency, "cash row without a parsable ending balance");
        }
        let record = BrokerRecord {
            join_key: currency.clone(),
            currency,
            category: None,
            subcategory: None,
            symbol: None,
            quantity: None,
            amount,
            cost_basis: None,
            value_jpy: None,
            cost_basis_jpy: None,
            strike: None,
            expiry: None,
            option_side: None,
        };
        merge_or_push(&mut records, &mut by_key, record);
    }
    records
}

/// Normalize open-position rows; join key is the position key.
///
/// Rows of categories the sync does not handle are not silently dropped:
/// their codes are collected and surfaced alongside the records.
pub fn normalize_open_positions(rows: &[RawRecord]) -> NormalizedPositions {
    let mut normalized = NormalizedPositions::default();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let code = non_empty(row.get("assetCategory")).unwrap_or_else(|| "STK".to_string());
        let category = InstrumentCategory::from_code(&code);
        if !category.is_supported() {
            debug!(category = %code, "unsupported instrument category dropped");
            normalized.unsupported.push(code);
            continue;
        }

        let currency = non_empty(row.get("currency")).unwrap_or_else(|| {
            debug!("position row without a currency attribute");
            String::new()
        });
        let mut record = BrokerRecord {
            join_key: String::new(),
            currency,
            category: Some(category),
            subcategory: non_empty(row.get("subCategory")),
            symbol: non_empty(row.get("symbol")),
            quantity: parse_decimal(row.get("position")),
            amount: parse_decimal(row.get("positionValue")),
            cost_basis: parse_decimal(row.get("costBasisMoney")),
            value_jpy: None,
            cost_basis_jpy: None,
            strike: non_empty(row.get("strike")),
            expiry: non_empty(row.get("expiry")),
            option_side: row.get("putCall").and_then(|raw| OptionSide::parse(raw)),
        };
        record.join_key = position_join_key(&record);
        merge_or_push(&mut normalized.records, &mut by_key, record);
    }
    normalized
}

/// Normalize scraped ledger rows paired with their resolved asset ids.
pub fn normalize_ledger_rows(
    table: LedgerTable,
    rows: &[(ScrapedRow, String)],
) -> Vec<LedgerRecord> {
    let (name_header, value_header) = match table {
        LedgerTable::CashDeposits => (CASH_NAME_HEADER, CASH_VALUE_HEADER),
        LedgerTable::Equities => (EQUITY_NAME_HEADER, EQUITY_VALUE_HEADER),
    };

    rows.iter()
        .map(|(row, asset_id)| {
            let display_name = non_empty(row.cells.get(name_header));
            if display_name.is_none() {
                debug!(table = %table, position = row.position, "ledger row without a name cell");
            }
            let value_jpy = row.cells.get(value_header).and_then(|v| parse_localized_int(v));
            if value_jpy.is_none() {
                debug!(table = %table, position = row.position, "ledger row without a parsable value cell");
            }
            let join_key = match (&display_name, table) {
                (Some(name), LedgerTable::CashDeposits) => name.trim().to_string(),
                (Some(name), LedgerTable::Equities) => ledger_position_key(name),
                (None, _) => String::new(),
            };
            LedgerRecord {
                row_position: row.position,
                asset_id: asset_id.clone(),
                join_key,
                display_name,
                value_jpy,
            }
        })
        .collect()
}

/// The position key both sides of the join agree on: the display name minus
/// its quantity suffix. Distinct option contracts on one underlying encode
/// expiry/strike/side in the name and therefore get distinct keys.
pub fn position_join_key(record: &BrokerRecord) -> String {
    strip_quantity_suffix(&format_asset_name(record)).to_string()
}

fn ledger_position_key(name: &str) -> String {
    let first = name.split('|').next().unwrap_or(name);
    strip_quantity_suffix(first.trim()).to_string()
}

/// Parse an integer out of localized display text, stripping thousands
/// separators and the yen unit suffix (`"1,234,567円"` → `1234567`).
pub fn parse_localized_int(text: &str) -> Option<i64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '円' && *c != '¥')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned
        .parse::<i64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(|f| f as i64))
}

fn parse_decimal(raw: Option<&String>) -> Option<f64> {
    let raw = raw?.trim().replace(',', "");
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok()
}

fn non_empty(raw: Option<&String>) -> Option<String> {
    raw.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string)
}

fn merge_or_push(
    records: &mut Vec<BrokerRecord>,
    by_key: &mut HashMap<String, usize>,
    record: BrokerRecord,
) {
    if let Some(&idx) = by_key.get(&record.join_key) {
        warn!(
            key = %record.join_key,
            "duplicate join key in broker snapshot, aggregating values"
        );
        let existing = &mut records[idx];
        existing.amount = merge_sum(existing.amount, record.amount);
        existing.cost_basis = merge_sum(existing.cost_basis, record.cost_basis);
        existing.quantity = merge_sum(existing.quantity, record.quantity);
    } else {
        by_key.insert(record.join_key.clone(), records.len());
        records.push(record);
    }
}

fn merge_sum(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (Some(x), None) => Some(x),
        (None, y) => y,
    }
}
