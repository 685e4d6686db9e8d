//! Ledger gateway port
//!
//! Single interface over the target web application: session login, table
//! scraping, stable-id resolution and the mutating actuations. Every
//! mutating call must be awaited to completion (the implementation waits
//! for the page to settle) before the next call: the rendered page is the
//! one shared mutable resource and each mutation can shift the row
//! positions and identifiers later lookups depend on.
//!
//! `delete_asset` and `delete_all` exist on the gateway but are never
//! invoked by reconciliation: the sync zeroes values instead of deleting,
//! preserving cost basis and history for closed positions.

use crate::domain::entities::ledger_record::LedgerTable;
use crate::domain::errors::LedgerError;
use crate::domain::value_objects::asset_type::AssetType;
use async_trait::async_trait;
use std::collections::HashMap;

/// One table row as scraped: cell text keyed by column header text, plus
/// the 1-based position of the row in the rendered table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedRow {
    pub position: usize,
    pub cells: HashMap<String, String>,
}

/// Gateway to the target application's manual-asset ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Authenticate and navigate to the ledger page.
    async fn login(&self, email: &str, password: &str) -> Result<(), LedgerError>;

    /// Scrape the named table from the current page.
    ///
    /// An absent table yields an empty vector (a legitimate state, e.g. no
    /// manual assets yet); a data row with fewer cells than the header row
    /// is a structural error.
    async fn scrape_table(&self, table: LedgerTable) -> Result<Vec<ScrapedRow>, LedgerError>;

    /// Resolve the stable asset id for a row by its current position.
    ///
    /// Positions shift on every mutation, so ids are resolved immediately
    /// after a scrape and never reused across actuations.
    async fn resolve_asset_id(
        &self,
        table: LedgerTable,
        row_position: usize,
    ) -> Result<String, LedgerError>;

    /// Update an existing row. `cost_basis_jpy` of `None` leaves the stored
    /// purchase price untouched so the target keeps tracking gains/losses.
    async fn update_asset(
        &self,
        table: LedgerTable,
        asset_id: &str,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: Option<i64>,
    ) -> Result<(), LedgerError>;

    /// Create a new manual-asset row.
    async fn create_asset(
        &self,
        asset_type: AssetType,
        name: &str,
        value_jpy: i64,
        cost_basis_jpy: i64,
    ) -> Result<(), LedgerError>;

    /// Delete one row. Available for explicit invocation only.
    async fn delete_asset(&self, table: LedgerTable, asset_id: &str) -> Result<(), LedgerError>;

    /// Delete every row of a table, returning how many were removed.
    /// Available for explicit invocation only.
    async fn delete_all(&self, table: LedgerTable) -> Result<usize, LedgerError>;
}
