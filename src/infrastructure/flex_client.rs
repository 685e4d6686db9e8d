//! # Broker report client (IBKR Flex Web Service)
//!
//! Downloads one Flex Query statement over the two-step web service
//! protocol:
//!
//! 1. `SendRequest` with the access token and query id returns a reference
//!    code (and the statement endpoint to poll);
//! 2. `GetStatement` with the reference code returns the statement XML,
//!    or an "in progress" acknowledgement while the report is still being
//!    generated; polled with a fixed delay, bounded by `poll_attempts`.
//!
//! Only the allow-listed attributes of each report section are extracted;
//! the `BASE_SUMMARY` aggregate row of the cash report is dropped at this
//! boundary. A statement without the requested section yields an empty
//! result, not an error: an account with no open positions is a
//! legitimate state.

use crate::domain::errors::ReportError;
use crate::domain::repositories::report_source::{RawRecord, ReportKind, ReportSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Flex Web Service base URL.
const FLEX_API_BASE: &str =
    "https://ndcdyn.interactivebrokers.com/AccountManagement/FlexWebService";

/// Web service protocol version.
const FLEX_VERSION: &str = "3";

/// Synthetic currency code of the cash report's aggregate row.
const BASE_SUMMARY: &str = "BASE_SUMMARY";

#[derive(Debug, Clone)]
pub struct FlexClientConfig {
    pub base_url: String,
    /// How often to poll `GetStatement` while generation is in progress.
    pub poll_attempts: u32,
    pub poll_delay: Duration,
}

impl Default for FlexClientConfig {
    fn default() -> Self {
        Self {
            base_url: FLEX_API_BASE.to_string(),
            poll_attempts: 5,
            poll_delay: Duration::from_secs(5),
        }
    }
}

/// Client for one Flex query on one account.
pub struct FlexQueryClient {
    client: Client,
    config: FlexClientConfig,
    token: Zeroizing<String>,
    query_id: String,
}

impl std::fmt::Debug for FlexQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlexQueryClient")
            .field("config", &self.config)
            .field("token", &"<REDACTED>")
            .field("query_id", &self.query_id)
            .finish()
    }
}

impl FlexQueryClient {
    pub fn new(token: Zeroizing<String>, query_id: String) -> Self {
        Self::with_config(token, query_id, FlexClientConfig::default())
    }

    pub fn with_config(
        token: Zeroizing<String>,
        query_id: String,
        config: FlexClientConfig,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            token,
            query_id,
        }
    }

    /// Run the SendRequest/GetStatement exchange and return the raw
    /// statement XML.
    async fn download_statement(&self) -> Result<String, ReportError> {
        let send_url = format!("{}/SendRequest", self.config.base_url);
        let body = self
            .client
            .get(&send_url)
            .query(&[
                ("t", self.token.as_str()),
                ("q", self.query_id.as_str()),
                ("v", FLEX_VERSION),
            ])
            .send()
            .await
            .map_err(|e| ReportError::Request(e.to_string()))?
            .text()
            .await
            .map_err(|e| ReportError::Request(e.to_string()))?;

        let ack: FlexAck = quick_xml::de::from_str(&body)
            .map_err(|e| ReportError::Parse(format!("SendRequest response: {e}")))?;
        if ack.status.as_deref() != Some("Success") {
            return Err(ReportError::Service(ack.describe_error()));
        }
        let reference_code = ack
            .reference_code
            .ok_or_else(|| ReportError::Parse("SendRequest response without a reference code".to_string()))?;
        let statement_url = ack
            .url
            .unwrap_or_else(|| format!("{}/GetStatement", self.config.base_url));
        debug!(reference_code = %reference_code, "statement request acknowledged");

        for attempt in 1..=self.config.poll_attempts {
            let body = self
                .client
                .get(&statement_url)
                .query(&[
                    ("t", self.token.as_str()),
                    ("q", reference_code.as_str()),
                    ("v", FLEX_VERSION),
                ])
                .send()
                .await
                .map_err(|e| ReportError::Request(e.to_string()))?
                .text()
                .await
                .map_err(|e| ReportError::Request(e.to_string()))?;

            if body.contains("<FlexQueryResponse") {
                return Ok(body);
            }

            let ack: FlexAck = quick_xml::de::from_str(&body)
                .map_err(|e| ReportError::Parse(format!("GetStatement response: {e}")))?;
            if ack.is_generation_in_progress() {
                debug!(attempt, "statement still generating");
                sleep(self.config.poll_delay).await;
                continue;
            }
            return Err(ReportError::Service(ack.describe_error()));
        }
        Err(ReportError::StatementNotReady {
            attempts: self.config.poll_attempts,
        })
    }
}

#[async_trait]
impl ReportSource for FlexQueryClient {
    async fn fetch(&self, kind: ReportKind) -> Result<Vec<RawRecord>, ReportError> {
        let xml = self.download_statement().await?;
        let response: FlexQueryResponse = quick_xml::de::from_str(&xml)
            .map_err(|e| ReportError::Parse(format!("statement: {e}")))?;
        let statement = response
            .flex_statements
            .and_then(|s| s.statements.into_iter().next())
            .ok_or_else(|| ReportError::Parse("statement without a FlexStatement".to_string()))?;

        let records: Vec<RawRecord> = match kind {
            ReportKind::CashReport => statement
                .cash_report
                .map(|report| {
                    report
                        .rows
                        .into_iter()
                        .filter(|row| row.currency.as_deref() != Some(BASE_SUMMARY))
                        .map(CashRow::into_raw)
                        .collect()
                })
                .unwrap_or_default(),
            ReportKind::OpenPositions => statement
                .open_positions
                .map(|report| {
                    report
                        .rows
                        .into_iter()
                        .map(PositionRow::into_raw)
                        .collect()
                })
                .unwrap_or_default(),
        };
        info!(kind = %kind, rows = records.len(), "fetched broker report");
        Ok(records)
    }
}

/// SendRequest/GetStatement acknowledgement envelope.
#[derive(Debug, Deserialize)]
struct FlexAck {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "ReferenceCode")]
    reference_code: Option<String>,
    #[serde(rename = "Url")]
    url: Option<String>,
    #[serde(rename = "ErrorCode")]
    error_code: Option<String>,
    #[serde(rename = "ErrorMessage")]
    error_message: Option<String>,
}

impl FlexAck {
    /// Error code 1019 means "statement generation in progress, try again".
    fn is_generation_in_progress(&self) -> bool {
        self.error_code.as_deref() == Some("1019")
            || self
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("in progress"))
    }

    fn describe_error(&self) -> String {
        match (&self.error_code, &self.error_message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "unknown service error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlexQueryResponse {
    #[serde(rename = "FlexStatements")]
    flex_statements: Option<FlexStatements>,
}

#[derive(Debug, Deserialize)]
struct FlexStatements {
    #[serde(rename = "FlexStatement", default)]
    statements: Vec<FlexStatement>,
}

#[derive(Debug, Deserialize)]
struct FlexStatement {
    #[serde(rename = "CashReport")]
    cash_report: Option<CashReport>,
    #[serde(rename = "OpenPositions")]
    open_positions: Option<OpenPositions>,
}

#[derive(Debug, Deserialize)]
struct CashReport {
    #[serde(rename = "CashReportCurrency", default)]
    rows: Vec<CashRow>,
}

#[derive(Debug, Deserialize)]
struct OpenPositions {
    #[serde(rename = "OpenPosition", default)]
    rows: Vec<PositionRow>,
}

/// Allow-listed attributes of one cash report row.
#[derive(Debug, Deserialize)]
struct CashRow {
    #[serde(rename = "@accountId")]
    account_id: Option<String>,
    #[serde(rename = "@currency")]
    currency: Option<String>,
    #[serde(rename = "@fromDate")]
    from_date: Option<String>,
    #[serde(rename = "@toDate")]
    to_date: Option<String>,
    #[serde(rename = "@endingCash")]
    ending_cash: Option<String>,
}

impl CashRow {
    fn into_raw(self) -> RawRecord {
        let mut record = RawRecord::new();
        insert(&mut record, "accountId", self.account_id);
        insert(&mut record, "currency", self.currency);
        insert(&mut record, "fromDate", self.from_date);
        insert(&mut record, "toDate", self.to_date);
        insert(&mut record, "endingCash", self.ending_cash);
        record
    }
}

/// Allow-listed attributes of one open position row.
#[derive(Debug, Deserialize)]
struct PositionRow {
    #[serde(rename = "@accountId")]
    account_id: Option<String>,
    #[serde(rename = "@currency")]
    currency: Option<String>,
    #[serde(rename = "@reportDate")]
    report_date: Option<String>,
    #[serde(rename = "@assetCategory")]
    asset_category: Option<String>,
    #[serde(rename = "@subCategory")]
    sub_category: Option<String>,
    #[serde(rename = "@symbol")]
    symbol: Option<String>,
    #[serde(rename = "@description")]
    description: Option<String>,
    #[serde(rename = "@listingExchange")]
    listing_exchange: Option<String>,
    #[serde(rename = "@openPrice")]
    open_price: Option<String>,
    #[serde(rename = "@costBasisPrice")]
    cost_basis_price: Option<String>,
    #[serde(rename = "@costBasisMoney")]
    cost_basis_money: Option<String>,
    #[serde(rename = "@side")]
    side: Option<String>,
    #[serde(rename = "@position")]
    position: Option<String>,
    #[serde(rename = "@positionValue")]
    position_value: Option<String>,
    #[serde(rename = "@fifoPnlUnrealized")]
    fifo_pnl_unrealized: Option<String>,
    #[serde(rename = "@strike")]
    strike: Option<String>,
    #[serde(rename = "@expiry")]
    expiry: Option<String>,
    #[serde(rename = "@putCall")]
    put_call: Option<String>,
}

impl PositionRow {
    fn into_raw(self) -> RawRecord {
        let mut record = RawRecord::new();
        insert(&mut record, "accountId", self.account_id);
        insert(&mut record, "currency", self.currency);
        insert(&mut record, "reportDate", self.report_date);
        insert(&mut record, "assetCategory", self.asset_category);
        insert(&mut record, "subCategory", self.sub_category);
        insert(&mut record, "symbol", self.symbol);
        insert(&mut record, "description", self.description);
        insert(&mut record, "listingExchange", self.listing_exchange);
        insert(&mut record, "openPrice", self.open_price);
        insert(&mut record, "costBasisPrice", self.cost_basis_price);
        insert(&mut record, "costBasisMoney", self.cost_basis_money);
        insert(&mut record, "side", self.side);
        insert(&mut record, "position", self.position);
        insert(&mut record, "positionValue", self.position_value);
        insert(&mut record, "fifoPnlUnrealized", self.fifo_pnl_unrealized);
        insert(&mut record, "strike", self.strike);
        insert(&mut record, "expiry", self.expiry);
        insert(&mut record, "putCall", self.put_call);
        record
    }
}

fn insert(record: &mut RawRecord, key: &str, value: Option<String>) {
    if let Some(value) = value {
        record.insert(key.to_string(), value);
    }
}
