//! Error taxonomy for one sync run
//!
//! Three boundary error types (report fetch, rate lookup, ledger gateway)
//! fold into `SyncError`. Fetch and rate errors are always fatal and occur
//! before any mutation; ledger errors can surface mid-run and leave the
//! ledger partially synced; rerunning the sync is the recovery mechanism,
//! since classification is a pure function of current state.

use thiserror::Error;

/// Errors from the broker report collaborator.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    #[error("report request failed: {0}")]
    Request(String),

    #[error("report service rejected the request: {0}")]
    Service(String),

    #[error("report statement not ready after {attempts} attempts")]
    StatementNotReady { attempts: u32 },

    #[error("malformed report payload: {0}")]
    Parse(String),
}

/// Errors from the FX rate collaborator.
#[derive(Debug, Clone, Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Request(String),

    #[error("malformed rate payload: {0}")]
    Parse(String),

    #[error("no rate available for {pair}")]
    Unavailable { pair: String },
}

/// Errors from the ledger gateway (login, scraping, actuation).
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("ledger request failed: {0}")]
    Request(String),

    #[error("malformed ledger table: {0}")]
    MalformedTable(String),

    #[error("expected page element not found: {0}")]
    MissingElement(String),

    #[error("actuation failed: {0}")]
    ActuationFailed(String),
}

/// Top-level error for a sync run.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
