//! End-to-end sync runs against mock collaborators
//!
//! Drives the orchestrator through full runs with canned broker reports,
//! fixed FX rates and an in-memory ledger gateway that records every
//! actuation, asserting on the exact calls the target application would
//! receive.

use async_trait::async_trait;
use mfsync::application::services::sync_service::SyncService;
use mfsync::domain::entities::ledger_record::LedgerTable;
use mfsync::domain::errors::{LedgerError, RateError, ReportError};
use mfsync::domain::repositories::ledger_gateway::{LedgerGateway, ScrapedRow};
use mfsync::domain::repositories::rate_source::RateSource;
use mfsync::domain::repositories::report_source::{RawRecord, ReportKind, ReportSource};
use mfsync::domain::value_objects::asset_type::AssetType;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Actuation {
    Login,
    Update {
        table: LedgerTable,
        asset_id: String,
        name: String,
        value_jpy: i64,
        cost_basis_jpy: Option<i64>,
    },
    Create {
        asset_type: AssetType,
        name: String,
        value_jpy: i64,
        cost_basis_jpy: i64,
    },
    Delete,
}

#[derive(Clone, Default)]
struct ActuationLog(Arc<Mutex<Vec<Actuation>>>);

impl ActuationLog {
    fn record(&self, actuation: Actuation) {
        self.0.lock().unwrap().push(actuation);
    }

    fn entries(&self) -> Vec<Actuation> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct MockReports {
    cash: Vec<RawRecord>,
    positions: Vec<RawRecord>,
    fail: bool,
}

#[async_trait]
impl ReportSource for MockReports {
    async fn fetch(&self, kind: ReportKind) -> Result<Vec<RawRecord>, ReportError> {
        if self.fail {
            return Err(ReportError::Request("connection refused".to_string()));
        }
        Ok(match kind {
            ReportKind::CashReport => self.cash.clone(),
            ReportKind::OpenPositions => self.positions.clone(),
        })
    }
}

#[derive(Default)]
struct MockRates {
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateSource for MockRates {
    async fn latest_rate(&self, from_currency: &str) -> Result<f64, RateError> {
        self.rates
            .get(from_currency)
            .copied()
            .ok_or_else(|| RateError::Unavailable {
                pair: format!("{from_currency}JPY=X"),
            })
    }
}

/// Seed rows: (display name, rendered value text, asset id).
type SeedRow = (&'static str, &'static str, &'static str);

#[derive(Default)]
struct MockLedger {
    cash_rows: Vec<SeedRow>,
    equity_rows: Vec<SeedRow>,
    log: ActuationLog,
}

impl MockLedger {
    fn rows_for(&self, table: LedgerTable) -> &[SeedRow] {
        match table {
            LedgerTable::CashDeposits => &self.cash_rows,
            LedgerTable::Equities => &self.equity_rows,
        }
    }
}

fn table_headers(table: LedgerTable) -> (&'static str, &'static str) {
    match table {
        LedgerTable::CashDeposits => ("種類・名称", "残高"),
        LedgerTable::Equities => ("銘柄名", "評価額"),
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn login(&self, _email: &str, _password: &str) -> Result<(), LedgerError> {
        self.log.record(Actuation::Login);
        Ok(())
    }

    async fn scrape_table(&self, table: LedgerTable) -> Result<Vec<ScrapedRow>, LedgerError> {
        let (name_header, value_header) = table_headers(table);
        Ok(self
            .rows_for(table)
            .iter()
            .enumerate()
            .map(|(idx, (name, value, _))| ScrapedRow {
                position: idx + 1,
                cells: HashMap::from([
                    (name_header.to_string(), name.to_string()),
                    (value_header.to_string(), value.to_string()),
                ]),
            })
            .collect())
    }

    async fn resolve_asset_id(
        &self,
        table: LedgerTable,
        row_position: usize,
    ) -> Result<String, LedgerError> {
        self.rows_for(table)
            .get(row_position - 1)
            .map(|(_, _, id)| id.to_string())
            .ok_or_else(|| LedgerError::MissingElement(format!("row {row_position}")))
    }

    async fn update_asset(
        &self,
        table: LedgerTable,
        asset_id: &str,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: Option<i64>,
    ) -> Result<(), LedgerError> {
        self.log.record(Actuation::Update {
            table,
            asset_id: asset_id.to_string(),
            name: name.to_string(),
            value_jpy,
            cost_basis_jpy,
        });
        Ok(())
    }

    async fn create_asset(
        &self,
        asset_type: AssetType,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: i64,
    ) -> Result<(), LedgerError> {
        self.log.record(Actuation::Create {
            asset_type,
            name: name.to_string(),
            value_jpy,
            cost_basis_jpy,
        });
        Ok(())
    }

    async fn delete_asset(&self, _table: LedgerTable, _asset_id: &str) -> Result<(), LedgerError> {
        self.log.record(Actuation::Delete);
        Ok(())
    }

    async fn delete_all(&self, _table: LedgerTable) -> Result<usize, LedgerError> {
        self.log.record(Actuation::Delete);
        Ok(0)
    }
}

fn raw(pairs: &[(&str, &str)]) -> RawRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn usd_jpy_150() -> MockRates {
    MockRates {
        rates: HashMap::from([("USD".to_string(), 150.0), ("EUR".to_string(), 160.0)]),
    }
}

#[tokio::test]
async fn test_cash_sync_leaves_matching_row_and_adds_new_currency() {
    let reports = MockReports {
        cash: vec![
            raw(&[("currency", "USD"), ("endingCash", "1000")]),
            raw(&[("currency", "EUR"), ("endingCash", "500")]),
        ],
        ..Default::default()
    };
    let ledger = MockLedger {
        cash_rows: vec![("USD", "150,000円", "7")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.cash.unchanged, 1);
    assert_eq!(summary.cash.added, 1);
    assert_eq!(summary.cash.modified, 0);
    assert_eq!(summary.cash.zeroed, 0);

    let entries = log.entries();
    assert_eq!(entries[0], Actuation::Login);
    assert_eq!(
        entries[1],
        Actuation::Create {
            asset_type: AssetType::CashDeposit,
            name: "EUR".to_string(),
            value_jpy: 80_000,
            cost_basis_jpy: 0,
        }
    );
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn test_vanished_position_is_zeroed_with_name_and_cost_basis_preserved() {
    let reports = MockReports::default();
    let ledger = MockLedger {
        equity_rows: vec![("AAPL (100)", "200,000円", "42")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.equity.zeroed, 1);
    let entries = log.entries();
    assert_eq!(
        entries[1],
        Actuation::Update {
            table: LedgerTable::Equities,
            asset_id: "42".to_string(),
            name: "AAPL (100)".to_string(),
            value_jpy: 0,
            cost_basis_jpy: None,
        }
    );
    // Conservative deletion: nothing is ever deleted by a sync run.
    assert!(!entries.contains(&Actuation::Delete));
}

#[tokio::test]
async fn test_changed_position_value_updates_without_touching_cost_basis() {
    let reports = MockReports {
        positions: vec![raw(&[
            ("assetCategory", "STK"),
            ("currency", "USD"),
            ("symbol", "AAPL"),
            ("position", "100"),
            ("positionValue", "1500"),
            ("costBasisMoney", "1200"),
        ])],
        ..Default::default()
    };
    let ledger = MockLedger {
        equity_rows: vec![("AAPL (100)", "200,000円", "42")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.equity.modified, 1);
    assert_eq!(
        log.entries()[1],
        Actuation::Update {
            table: LedgerTable::Equities,
            asset_id: "42".to_string(),
            name: "AAPL (100)".to_string(),
            value_jpy: 225_000,
            cost_basis_jpy: None,
        }
    );
}

#[tokio::test]
async fn test_second_run_on_synced_state_is_a_noop() {
    // Ledger already reflects the broker snapshot exactly.
    let reports = MockReports {
        cash: vec![raw(&[("currency", "USD"), ("endingCash", "1000")])],
        positions: vec![raw(&[
            ("assetCategory", "STK"),
            ("currency", "USD"),
            ("symbol", "AAPL"),
            ("position", "100"),
            ("positionValue", "1500"),
            ("costBasisMoney", "1200"),
        ])],
        ..Default::default()
    };
    let ledger = MockLedger {
        cash_rows: vec![("USD", "150,000円", "7")],
        equity_rows: vec![("AAPL (100)", "225,000円", "42")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.mutations(), 0);
    assert_eq!(summary.cash.unchanged, 1);
    assert_eq!(summary.equity.unchanged, 1);
    assert_eq!(log.entries(), vec![Actuation::Login]);
}

#[tokio::test]
async fn test_new_option_position_creates_index_option_with_encoded_name() {
    let reports = MockReports {
        positions: vec![raw(&[
            ("assetCategory", "OPT"),
            ("currency", "USD"),
            ("symbol", "AAPL"),
            ("position", "10"),
            ("positionValue", "1500"),
            ("costBasisMoney", "900"),
            ("strike", "150.0"),
            ("expiry", "20240119"),
            ("putCall", "C"),
        ])],
        ..Default::default()
    };
    let ledger = MockLedger::default();
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.equity.added, 1);
    assert_eq!(
        log.entries()[1],
        Actuation::Create {
            asset_type: AssetType::IndexOption,
            name: "AAPL Jan24$150C (10)".to_string(),
            value_jpy: 225_000,
            cost_basis_jpy: 135_000,
        }
    );
}

#[tokio::test]
async fn test_report_fetch_failure_aborts_before_any_mutation() {
    let reports = MockReports {
        fail: true,
        ..Default::default()
    };
    let ledger = MockLedger {
        cash_rows: vec![("USD", "150,000円", "7")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let result = service.run("user@example.com", "pass").await;

    assert!(result.is_err());
    assert!(log.entries().is_empty(), "no login, no actuations");
}

#[tokio::test]
async fn test_missing_rate_aborts_before_login() {
    let reports = MockReports {
        cash: vec![raw(&[("currency", "CHF"), ("endingCash", "100")])],
        ..Default::default()
    };
    let ledger = MockLedger::default();
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let result = service.run("user@example.com", "pass").await;

    assert!(result.is_err());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_unsupported_categories_are_counted_not_created() {
    let reports = MockReports {
        positions: vec![
            raw(&[
                ("assetCategory", "STK"),
                ("currency", "USD"),
                ("symbol", "AAPL"),
                ("position", "100"),
                ("positionValue", "1500"),
                ("costBasisMoney", "1200"),
            ]),
            raw(&[
                ("assetCategory", "FUT"),
                ("currency", "USD"),
                ("symbol", "ES"),
                ("position", "1"),
                ("positionValue", "5000"),
            ]),
        ],
        ..Default::default()
    };
    let ledger = MockLedger::default();
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    let summary = service.run("user@example.com", "pass").await.unwrap();

    assert_eq!(summary.equity.unsupported, 1);
    assert_eq!(summary.equity.added, 1);
    // Only the stock row produced a creation.
    let creates = log
        .entries()
        .into_iter()
        .filter(|a| matches!(a, Actuation::Create { .. }))
        .count();
    assert_eq!(creates, 1);
}

#[tokio::test]
async fn test_updates_apply_before_creations() {
    let reports = MockReports {
        cash: vec![
            raw(&[("currency", "USD"), ("endingCash", "2000")]),
            raw(&[("currency", "EUR"), ("endingCash", "500")]),
        ],
        ..Default::default()
    };
    let ledger = MockLedger {
        cash_rows: vec![("USD", "150,000円", "7")],
        ..Default::default()
    };
    let log = ledger.log.clone();

    let mut service = SyncService::new(reports, usd_jpy_150(), ledger);
    service.run("user@example.com", "pass").await.unwrap();

    let entries = log.entries();
    assert!(matches!(entries[1], Actuation::Update { value_jpy: 300_000, .. }));
    assert!(matches!(entries[2], Actuation::Create { .. }));
}
