//! Broker-side snapshot rows
//!
//! One `BrokerRecord` per cash currency (cash report) or per open position
//! (positions report). Records are immutable for the duration of one sync
//! run; the converted yen fields are filled in by the currency converter
//! before reconciliation.

use chrono::NaiveDate;

/// Instrument category as reported by the broker statement.
///
/// Closed enumeration: category codes the statement can carry but that the
/// sync does not handle end up in `Unsupported` and are counted at
/// normalization instead of being dropped silently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstrumentCategory {
    Stock,
    OptionContract,
    Future,
    Cfd,
    Warrant,
    Forex,
    Fund,
    Bond,
    CommoditySpread,
    Unsupported(String),
}

impl InstrumentCategory {
    /// Parse a broker category code (e.g. "STK", "OPT").
    pub fn from_code(code: &str) -> Self {
        match code {
            "STK" => InstrumentCategory::Stock,
            "OPT" => InstrumentCategory::OptionContract,
            "FUT" => InstrumentCategory::Future,
            "CFD" => InstrumentCategory::Cfd,
            "WAR" => InstrumentCategory::Warrant,
            "CASH" | "SWP" => InstrumentCategory::Forex,
            "FND" => InstrumentCategory::Fund,
            "BND" => InstrumentCategory::Bond,
            "ICS" => InstrumentCategory::CommoditySpread,
            other => InstrumentCategory::Unsupported(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            InstrumentCategory::Stock => "STK",
            InstrumentCategory::OptionContract => "OPT",
            InstrumentCategory::Future => "FUT",
            InstrumentCategory::Cfd => "CFD",
            InstrumentCategory::Warrant => "WAR",
            InstrumentCategory::Forex => "CASH",
            InstrumentCategory::Fund => "FND",
            InstrumentCategory::Bond => "BND",
            InstrumentCategory::CommoditySpread => "ICS",
            InstrumentCategory::Unsupported(code) => code,
        }
    }

    /// Whether the position sync handles this category.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            InstrumentCategory::Stock | InstrumentCategory::OptionContract
        )
    }
}

/// Option side (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    /// Parse a broker side value ("C", "CALL", "P", "PUT", any case).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(OptionSide::Call),
            "P" | "PUT" => Some(OptionSide::Put),
            _ => None,
        }
    }

    /// Single-letter indicator used in display names.
    pub fn indicator(&self) -> char {
        match self {
            OptionSide::Call => 'C',
            OptionSide::Put => 'P',
        }
    }
}

/// One broker-reported row, normalized to typed fields.
///
/// `strike` and `expiry` stay raw strings so that display-name formatting
/// can degrade gracefully on values the broker reports in an unexpected
/// shape; typed accessors parse them on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord {
    /// Natural key the reconciliation joins on: currency for cash rows,
    /// the position key (symbol, or the composite option key) for positions.
    pub join_key: String,
    pub currency: String,
    /// Absent for cash rows, which are balances rather than instruments.
    pub category: Option<InstrumentCategory>,
    pub subcategory: Option<String>,
    pub symbol: Option<String>,
    pub quantity: Option<f64>,
    /// Amount in the native currency (ending cash or position value).
    pub amount: Option<f64>,
    /// Cost basis in the native currency (positions only).
    pub cost_basis: Option<f64>,
    /// Converted reporting-currency value; filled by the currency converter.
    pub value_jpy: Option<i64>,
    /// Converted cost basis; filled by the currency converter.
    pub cost_basis_jpy: Option<i64>,
    pub strike: Option<String>,
    pub expiry: Option<String>,
    pub option_side: Option<OptionSide>,
}

impl BrokerRecord {
    pub fn is_option(&self) -> bool {
        self.category == Some(InstrumentCategory::OptionContract)
    }

    /// Strike price parsed to a number, if present and well-formed.
    pub fn strike_price(&self) -> Option<f64> {
        self.strike.as_deref().and_then(|s| s.trim().parse().ok())
    }

    /// Expiry parsed from the broker's 8-digit date form (e.g. 20240119).
    pub fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry
            .as_deref()
            .and_then(|e| NaiveDate::parse_from_str(e.trim(), "%Y%m%d").ok())
    }
}
