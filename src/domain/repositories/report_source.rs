//! Report-fetch port
//!
//! Abstracts the broker's reporting API. Implementations return flat
//! attribute records (string keys and values, allow-listed per report kind);
//! typing happens in the normalizer. Keeping the port this thin lets tests
//! feed canned records without any XML or HTTP involved.

use crate::domain::errors::ReportError;
use async_trait::async_trait;
use std::collections::HashMap;

/// One raw attribute record from a broker report.
pub type RawRecord = HashMap<String, String>;

/// The two report kinds one sync run consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    CashReport,
    OpenPositions,
}

impl ReportKind {
    /// Element name of the report section in the statement document.
    pub fn section_name(&self) -> &'static str {
        match self {
            ReportKind::CashReport => "CashReport",
            ReportKind::OpenPositions => "OpenPositions",
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.section_name())
    }
}

/// Source of broker report extracts.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fetch one report extract.
    ///
    /// An account with nothing to report yields an empty vector, not an
    /// error. Errors mean the report could not be retrieved at all and are
    /// fatal to the run.
    async fn fetch(&self, kind: ReportKind) -> Result<Vec<RawRecord>, ReportError>;
}
