//! Display-name formatting
//!
//! The target system's name field accepts at most 20 characters, so names
//! pack the identifying attributes as tightly as possible:
//!
//! - stocks:  `"AAPL (100)"`
//! - options: `"AAPL Jan24$150C (10)"`: expiry abbreviation, strike and
//!   side letter, so a call and a put on the same strike/date stay distinct.
//!
//! Formatting must never abort a sync: any attribute that fails to parse
//! degrades to a best-effort raw substring instead of an error.

use crate::domain::entities::broker_record::BrokerRecord;
use chrono::NaiveDate;

/// Hard cap of the target system's name input field.
pub const MAX_NAME_LEN: usize = 20;

/// Format the display name for one broker record.
///
/// Output is always at most [`MAX_NAME_LEN`] characters.
pub fn format_asset_name(record: &BrokerRecord) -> String {
    let symbol = record.symbol.as_deref().unwrap_or("UNKNOWN");
    let quantity = format_quantity(record.quantity);
    if record.is_option() {
        format_option_name(record, symbol, &quantity)
    } else {
        format_stock_name(symbol, &quantity)
    }
}

/// Inverse of the naming convention: drop the trailing `" (qty)"` group.
///
/// Used to derive the position join key from a formatted or scraped name;
/// names without the suffix pass through unchanged.
pub fn strip_quantity_suffix(name: &str) -> &str {
    let trimmed = name.trim_end();
    if trimmed.ends_with(')') {
        if let Some(idx) = trimmed.rfind(" (") {
            return &trimmed[..idx];
        }
    }
    trimmed
}

/// `"{symbol} ({qty})"`, quantity suffix preserved under truncation.
fn format_stock_name(symbol: &str, quantity: &str) -> String {
    let name = format!("{} ({})", symbol, quantity);
    if name.chars().count() <= MAX_NAME_LEN {
        return name;
    }
    let suffix = format!(" ({})", quantity);
    let suffix_len = suffix.chars().count();
    if suffix_len >= MAX_NAME_LEN {
        return truncate(&name);
    }
    let keep: String = symbol.chars().take(MAX_NAME_LEN - suffix_len).collect();
    format!("{}{}", keep, suffix)
}

/// `"{symbol} {expiry}{strike}{side} ({qty})"`, e.g. `"AAPL Jan24$150C (10)"`.
///
/// If the assembled name exceeds the cap and the symbol is longer than four
/// characters, the symbol is shortened to its first three and the name
/// rebuilt once; the result is hard-truncated regardless.
fn format_option_name(record: &BrokerRecord, symbol: &str, quantity: &str) -> String {
    let expiry = format_expiry(record.expiry.as_deref());
    let strike = format_strike(record.strike.as_deref());
    let side = record
        .option_side
        .map(|s| s.indicator().to_string())
        .unwrap_or_default();
    let contract = format!("{}{}{}", expiry, strike, side);

    let name = assemble(symbol, &contract, quantity);
    if name.chars().count() <= MAX_NAME_LEN {
        return name;
    }
    if symbol.chars().count() > 4 {
        let short: String = symbol.chars().take(3).collect();
        return truncate(&assemble(&short, &contract, quantity));
    }
    truncate(&name)
}

fn assemble(symbol: &str, contract: &str, quantity: &str) -> String {
    let mut parts: Vec<&str> = vec![symbol];
    if !contract.is_empty() {
        parts.push(contract);
    }
    let quantity_part = format!("({})", quantity);
    parts.push(&quantity_part);
    parts.join(" ")
}

/// `20240119` → `"Jan24"`; anything else degrades to its first six chars.
fn format_expiry(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r.trim(),
        _ => return String::new(),
    };
    match NaiveDate::parse_from_str(raw, "%Y%m%d") {
        Ok(date) => date.format("%b%y").to_string(),
        Err(_) => raw.chars().take(6).collect(),
    }
}

/// `"150.0"` → `"$150"`, `"152.5"` → `"$152.5"`; unparsable degrades to the
/// raw text behind the `$` prefix.
fn format_strike(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r.trim(),
        _ => return String::new(),
    };
    match raw.parse::<f64>() {
        Ok(strike) if strike.fract() == 0.0 => format!("${}", strike as i64),
        Ok(strike) => format!("${:.1}", strike),
        Err(_) => format!("${}", raw),
    }
}

/// Whole quantities render without a decimal point; missing renders as 0.
fn format_quantity(quantity: Option<f64>) -> String {
    match quantity {
        Some(q) if q.fract() == 0.0 => format!("{}", q as i64),
        Some(q) => format!("{}", q),
        None => "0".to_string(),
    }
}

fn truncate(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}
