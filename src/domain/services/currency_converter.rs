//! Currency conversion into the reporting currency
//!
//! Wraps the rate port with a per-run memo: each currency is looked up at
//! most once per sync run, and rows already denominated in the reporting
//! currency short-circuit to rate 1 without a lookup. There is deliberately
//! no cross-run caching and no stale-rate fallback: a rate that cannot be
//! fetched for a currency the snapshot actually uses aborts the run before
//! any mutation happens.

use crate::domain::entities::broker_record::BrokerRecord;
use crate::domain::errors::RateError;
use crate::domain::repositories::rate_source::RateSource;
use std::collections::HashMap;
use tracing::debug;

/// The fixed reporting currency of the target ledger.
pub const REPORTING_CURRENCY: &str = "JPY";

/// Converts broker records' native amounts into integer yen.
pub struct CurrencyConverter<R: RateSource> {
    rates: R,
    memo: HashMap<String, f64>,
}

impl<R: RateSource> CurrencyConverter<R> {
    pub fn new(rates: R) -> Self {
        Self {
            rates,
            memo: HashMap::new(),
        }
    }

    /// Rate into the reporting currency, memoized for this run.
    pub async fn rate_for(&mut self, currency: &str) -> Result<f64, RateError> {
        if currency == REPORTING_CURRENCY {
            return Ok(1.0);
        }
        if let Some(rate) = self.memo.get(currency) {
            return Ok(*rate);
        }
        let rate = self.rates.latest_rate(currency).await?;
        debug!(currency = %currency, rate, "fetched conversion rate");
        self.memo.insert(currency.to_string(), rate);
        Ok(rate)
    }

    /// Fill `value_jpy` / `cost_basis_jpy` on every record.
    ///
    /// Conversion truncates toward zero, matching the integer-yen
    /// representation the target ledger uses. Absent native amounts stay
    /// absent; they must never become a concrete zero.
    pub async fn convert_records(
        &mut self,
        records: &mut [BrokerRecord],
    ) -> Result<(), RateError> {
        for record in records.iter_mut() {
            if record.amount.is_none() && record.cost_basis.is_none() {
                continue;
            }
            let rate = self.rate_for(&record.currency).await?;
            record.value_jpy = record.amount.map(|a| (a * rate) as i64);
            record.cost_basis_jpy = record.cost_basis.map(|c| (c * rate) as i64);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedRates {
        rate: f64,
        lookups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateSource for FixedRates {
        async fn latest_rate(&self, from_currency: &str) -> Result<f64, RateError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if from_currency == "XXX" {
                return Err(RateError::Unavailable {
                    pair: format!("{from_currency}JPY=X"),
                });
            }
            Ok(self.rate)
        }
    }

    fn cash(currency: &str, amount: Option<f64>) -> BrokerRecord {
        BrokerRecord {
            join_key: currency.to_string(),
            currency: currency.to_string(),
            category: None,
            subcategory: None,
            symbol: None,
            quantity: None,
            amount,
            cost_basis: None,
            value_jpy: None,
            cost_basis_jpy: None,
            strike: None,
            expiry: None,
            option_side: None,
        }
    }

    #[tokio::test]
    async fn test_reporting_currency_short_circuits() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut converter = CurrencyConverter::new(FixedRates {
            rate: 150.0,
            lookups: lookups.clone(),
        });
        let mut records = vec![cash("JPY", Some(1234.0))];
        converter.convert_records(&mut records).await.unwrap();
        assert_eq!(records[0].value_jpy, Some(1234));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rates_are_memoized_per_currency() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut converter = CurrencyConverter::new(FixedRates {
            rate: 150.0,
            lookups: lookups.clone(),
        });
        let mut records = vec![
            cash("USD", Some(100.0)),
            cash("USD", Some(50.0)),
            cash("USD", Some(25.0)),
        ];
        converter.convert_records(&mut records).await.unwrap();
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        assert_eq!(records[0].value_jpy, Some(15_000));
    }

    #[tokio::test]
    async fn test_conversion_truncates_toward_zero() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut converter = CurrencyConverter::new(FixedRates {
            rate: 150.5,
            lookups,
        });
        let mut records = vec![cash("USD", Some(10.01))];
        converter.convert_records(&mut records).await.unwrap();
        // 10.01 * 150.5 = 1506.505 → 1506
        assert_eq!(records[0].value_jpy, Some(1506));
    }

    #[tokio::test]
    async fn test_absent_amount_stays_absent() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut converter = CurrencyConverter::new(FixedRates { rate: 150.0, lookups });
        let mut records = vec![cash("USD", None)];
        converter.convert_records(&mut records).await.unwrap();
        assert_eq!(records[0].value_jpy, None);
    }

    #[tokio::test]
    async fn test_unavailable_rate_is_fatal() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let mut converter = CurrencyConverter::new(FixedRates { rate: 150.0, lookups });
        let mut records = vec![cash("XXX", Some(1.0))];
        let result = converter.convert_records(&mut records).await;
        assert!(result.is_err());
    }
}
