//! Asset-type classification
//!
//! Maps a broker instrument (currency, category, optional subcategory) onto
//! the target system's closed taxonomy. Total: every input yields a code,
//! with per-category fallbacks last. The currency buckets and precedence
//! rules mirror the target system's fixed enumeration exactly.

use crate::domain::entities::broker_record::InstrumentCategory;
use crate::domain::value_objects::asset_type::AssetType;

/// Subcategory markers, matched as uppercased substrings.
const GOVERNMENT_MARKER: &str = "GOVT";
const CORPORATE_MARKER: &str = "CORP";
const COMMODITY_MARKER: &str = "COMM";

/// Classify one instrument into the target taxonomy. Never fails.
pub fn classify(
    currency: &str,
    category: &InstrumentCategory,
    subcategory: Option<&str>,
) -> AssetType {
    let subcategory = subcategory.map(|s| s.to_ascii_uppercase());
    match category {
        InstrumentCategory::OptionContract => AssetType::IndexOption,
        // Warrants classify like stocks, subcategory ignored.
        InstrumentCategory::Stock | InstrumentCategory::Warrant => {
            stock_type_for_currency(currency)
        }
        InstrumentCategory::Future => match &subcategory {
            Some(sub) if sub.contains(COMMODITY_MARKER) => AssetType::CommodityFuture,
            _ => AssetType::IndexFuture,
        },
        InstrumentCategory::Cfd => AssetType::Cfd,
        InstrumentCategory::CommoditySpread => AssetType::CommodityFuture,
        InstrumentCategory::Forex => AssetType::OtcForex,
        InstrumentCategory::Fund => {
            if currency == "JPY" {
                AssetType::DomesticFund
            } else {
                AssetType::ForeignFund
            }
        }
        // Subcategory checks take precedence over the currency check.
        InstrumentCategory::Bond => match &subcategory {
            Some(sub) if sub.contains(GOVERNMENT_MARKER) => AssetType::GovernmentBond,
            Some(sub) if sub.contains(CORPORATE_MARKER) => AssetType::CorporateBond,
            _ if currency != "JPY" => AssetType::ForeignBond,
            _ => AssetType::OtherBond,
        },
        // Unreachable from the orchestrator: unsupported rows are dropped
        // with a diagnostic count before classification.
        InstrumentCategory::Unsupported(_) => AssetType::OtherStock,
    }
}

/// Stock bucket by listing currency, fallback last.
fn stock_type_for_currency(currency: &str) -> AssetType {
    match currency {
        "JPY" => AssetType::DomesticStock,
        "USD" => AssetType::UsStock,
        "CNY" | "HKD" => AssetType::ChinaStock,
        "CAD" | "GBP" | "EUR" | "AUD" | "NZD" | "SGD" => AssetType::ForeignStock,
        _ => AssetType::OtherStock,
    }
}
