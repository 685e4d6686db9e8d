//! Broker-to-ledger sync library
//!
//! Keeps a personal-finance ledger's manual assets (cash deposits and
//! equity/derivative positions) consistent with a brokerage account, with
//! the broker as the source of truth. Ledger rows are never deleted
//! automatically. A position the broker no longer reports is zeroed out,
//! preserving its cost basis and history.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod secrets;
