//! Sync orchestrator
//!
//! Sequences one sync run against the three collaborators: fetch broker
//! reports → normalize → convert to yen → log in → per table: scrape,
//! resolve ids, reconcile, actuate. Fully sequential: every actuation is
//! awaited to completion before the next, because each mutation can shift
//! the row positions and identifiers later lookups depend on.
//!
//! Both reports are fetched and converted before the first mutation, so a
//! fetch or rate failure aborts the run with the ledger untouched. A
//! failure mid-actuation leaves the ledger partially synced; rerunning the
//! sync re-derives the remaining actions from current state.

use crate::domain::entities::broker_record::{BrokerRecord, InstrumentCategory};
use crate::domain::entities::ledger_record::LedgerTable;
use crate::domain::errors::SyncError;
use crate::domain::repositories::ledger_gateway::LedgerGateway;
use crate::domain::repositories::rate_source::RateSource;
use crate::domain::repositories::report_source::{ReportKind, ReportSource};
use crate::domain::services::asset_classifier::classify;
use crate::domain::services::currency_converter::CurrencyConverter;
use crate::domain::services::name_formatter::format_asset_name;
use crate::domain::services::normalizer;
use crate::domain::services::reconciliation::{reconcile, ReconciledRow, SyncAction};
use crate::domain::value_objects::asset_type::AssetType;
use tracing::{info, warn};

/// Per-table outcome counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub unchanged: usize,
    pub modified: usize,
    pub zeroed: usize,
    pub added: usize,
    /// Broker rows dropped because their instrument category is unsupported.
    pub unsupported: usize,
}

impl TableSummary {
    pub fn mutations(&self) -> usize {
        self.modified + self.zeroed + self.added
    }
}

/// Outcome of one full sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cash: TableSummary,
    pub equity: TableSummary,
}

impl SyncSummary {
    pub fn mutations(&self) -> usize {
        self.cash.mutations() + self.equity.mutations()
    }
}

/// Orchestrates one sync run end to end.
pub struct SyncService<R, F, L>
where
    R: ReportSource,
    F: RateSource,
    L: LedgerGateway,
{
    reports: R,
    converter: CurrencyConverter<F>,
    ledger: L,
}

impl<R, F, L> SyncService<R, F, L>
where
    R: ReportSource,
    F: RateSource,
    L: LedgerGateway,
{
    pub fn new(reports: R, rates: F, ledger: L) -> Self {
        Self {
            reports,
            converter: CurrencyConverter::new(rates),
            ledger,
        }
    }

    /// Run one sync: cash deposits first, then equity positions.
    pub async fn run(&mut self, email: &str, password: &str) -> Result<SyncSummary, SyncError> {
        // Fetch and convert everything up front: no mutation has happened
        // yet, so any failure here leaves the ledger untouched.
        let cash_raw = self.reports.fetch(ReportKind::CashReport).await?;
        let positions_raw = self.reports.fetch(ReportKind::OpenPositions).await?;

        let mut cash_rows = normalizer::normalize_cash_report(&cash_raw);
        let mut positions = normalizer::normalize_open_positions(&positions_raw);
        if positions.records.is_empty() {
            info!("no open positions reported");
        }
        if !positions.unsupported.is_empty() {
            warn!(
                count = positions.unsupported.len(),
                categories = ?positions.unsupported,
                "dropped broker rows with unsupported instrument categories"
            );
        }

        self.converter.convert_records(&mut cash_rows).await?;
        self.converter.convert_records(&mut positions.records).await?;

        self.ledger.login(email, password).await?;

        let unsupported = positions.unsupported.len();
        let mut summary = SyncSummary {
            cash: self
                .sync_table(LedgerTable::CashDeposits, cash_rows)
                .await?,
            equity: self
                .sync_table(LedgerTable::Equities, positions.records)
                .await?,
        };
        summary.equity.unsupported = unsupported;

        info!(
            cash_modified = summary.cash.modified,
            cash_zeroed = summary.cash.zeroed,
            cash_added = summary.cash.added,
            equity_modified = summary.equity.modified,
            equity_zeroed = summary.equity.zeroed,
            equity_added = summary.equity.added,
            "sync run complete"
        );
        Ok(summary)
    }

    /// Reconcile one table and apply the resulting actions in order:
    /// value updates, then zero-outs, then creations.
    async fn sync_table(
        &mut self,
        table: LedgerTable,
        broker_rows: Vec<BrokerRecord>,
    ) -> Result<TableSummary, SyncError> {
        let scraped = self.ledger.scrape_table(table).await?;
        let mut rows_with_ids = Vec::with_capacity(scraped.len());
        for row in scraped {
            let asset_id = self.ledger.resolve_asset_id(table, row.position).await?;
            rows_with_ids.push((row, asset_id));
        }
        let ledger_rows = normalizer::normalize_ledger_rows(table, &rows_with_ids);

        let reconciled = reconcile(broker_rows, ledger_rows);
        let mut summary = TableSummary::default();

        for row in reconciled.iter().filter(|r| r.action == SyncAction::Modify) {
            self.apply_modify(table, row).await?;
            summary.modified += 1;
        }
        for row in reconciled
            .iter()
            .filter(|r| r.action == SyncAction::ModifyToZero)
        {
            self.apply_zero_out(table, row).await?;
            summary.zeroed += 1;
        }
        for row in reconciled.iter().filter(|r| r.action == SyncAction::Add) {
            self.apply_add(table, row).await?;
            summary.added += 1;
        }
        summary.unchanged = reconciled
            .iter()
            .filter(|r| r.action == SyncAction::Unchanged)
            .count();

        Ok(summary)
    }

    /// Update the current value only; the stored cost basis keeps tracking
    /// gains and losses across runs.
    async fn apply_modify(&self, table: LedgerTable, row: &ReconciledRow) -> Result<(), SyncError> {
        let (Some(broker), Some(ledger)) = (&row.broker, &row.ledger) else {
            return Ok(());
        };
        let Some(value_jpy) = broker.value_jpy else {
            return Ok(());
        };
        let name = display_name_for(table, broker);
        info!(table = %table, key = %row.join_key, value_jpy, "updating ledger row");
        self.ledger
            .update_asset(table, &ledger.asset_id, &name, value_jpy, None)
            .await?;
        Ok(())
    }

    /// Zero the value, keep the row: the existing display name and cost
    /// basis survive so closed positions keep their history.
    async fn apply_zero_out(
        &self,
        table: LedgerTable,
        row: &ReconciledRow,
    ) -> Result<(), SyncError> {
        let Some(ledger) = &row.ledger else {
            return Ok(());
        };
        let name = ledger
            .display_name
            .clone()
            .unwrap_or_else(|| ledger.join_key.clone());
        info!(table = %table, key = %row.join_key, "zeroing ledger row instead of deleting");
        self.ledger
            .update_asset(table, &ledger.asset_id, &name, 0, None)
            .await?;
        Ok(())
    }

    async fn apply_add(&self, table: LedgerTable, row: &ReconciledRow) -> Result<(), SyncError> {
        let Some(broker) = &row.broker else {
            return Ok(());
        };
        let value_jpy = broker.value_jpy.unwrap_or(0);
        let (asset_type, name, cost_basis_jpy) = match table {
            LedgerTable::CashDeposits => (AssetType::CashDeposit, broker.currency.clone(), 0),
            LedgerTable::Equities => {
                let category = broker
                    .category
                    .clone()
                    .unwrap_or(InstrumentCategory::Stock);
                let asset_type =
                    classify(&broker.currency, &category, broker.subcategory.as_deref());
                (
                    asset_type,
                    format_asset_name(broker),
                    broker.cost_basis_jpy.unwrap_or(0),
                )
            }
        };
        info!(
            table = %table,
            key = %row.join_key,
            asset_type = %asset_type,
            value_jpy,
            "creating ledger row"
        );
        self.ledger
            .create_asset(asset_type, &name, value_jpy, cost_basis_jpy)
            .await?;
        Ok(())
    }
}

/// Name written on a value update: currency for cash rows, the formatted
/// instrument name for positions.
fn display_name_for(table: LedgerTable, broker: &BrokerRecord) -> String {
    match table {
        LedgerTable::CashDeposits => broker.currency.clone(),
        LedgerTable::Equities => format_asset_name(broker),
    }
}
