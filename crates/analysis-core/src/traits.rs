use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{AnalysisError, FactorPanel, PriceSeries};

/// Source of daily closing prices (adjusted close when the provider has one).
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider label used in logs.
    fn name(&self) -> &str;

    /// Daily prices for `ticker` in `[start, end)`.
    ///
    /// Returns `AnalysisError::DataUnavailable` when the provider has no rows.
    async fn fetch_daily_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AnalysisError>;
}

/// Source of the monthly three-factor dataset.
#[async_trait]
pub trait FactorProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One row per calendar month from `start`'s month through `end`'s month,
    /// values as fractions.
    async fn fetch_factor_panel(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FactorPanel, AnalysisError>;
}
