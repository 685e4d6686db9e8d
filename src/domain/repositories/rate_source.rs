//! FX-rate port
//!
//! The target currency is fixed to the reporting currency; implementations
//! only take the source side of the pair. Rows already denominated in the
//! reporting currency never reach this port; the currency converter
//! short-circuits them to rate 1.

use crate::domain::errors::RateError;
use async_trait::async_trait;

/// Source of latest FX rates into the reporting currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Latest rate from `from_currency` into the reporting currency.
    async fn latest_rate(&self, from_currency: &str) -> Result<f64, RateError>;
}
