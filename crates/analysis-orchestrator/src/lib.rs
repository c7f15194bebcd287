use analysis_core::{AnalysisError, ExpectedReturnReport, FactorProvider, PriceProvider};
use chrono::NaiveDate;
use quant_analysis::QuantAnalysisEngine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Benchmark used when none is configured (S&P 500 index on Yahoo).
pub const DEFAULT_BENCHMARK: &str = "^GSPC";

const MAX_TICKER_LEN: usize = 15;

/// A validated expected-return request. The ticker is upper-cased and the
/// range is half-open: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturnRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExpectedReturnRequest {
    pub fn new(ticker: &str, start: NaiveDate, end: NaiveDate) -> Result<Self, AnalysisError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
            return Err(AnalysisError::InvalidData(format!(
                "Ticker must be 1-{} characters",
                MAX_TICKER_LEN
            )));
        }
        if !ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
        {
            return Err(AnalysisError::InvalidData(format!(
                "Ticker '{}' contains unsupported characters",
                ticker
            )));
        }
        if start >= end {
            return Err(AnalysisError::InvalidData(format!(
                "Start date {} must be before end date {}",
                start, end
            )));
        }
        Ok(Self { ticker, start, end })
    }
}

/// Runs one request end to end: fetch, transform, align, regress, assemble.
///
/// Providers are injected at construction and shared across requests; no
/// request state outlives the call.
pub struct AnalysisOrchestrator {
    price_provider: Arc<dyn PriceProvider>,
    factor_provider: Arc<dyn FactorProvider>,
    benchmark: String,
    quant_analyzer: QuantAnalysisEngine,
}

impl AnalysisOrchestrator {
    pub fn new(
        price_provider: Arc<dyn PriceProvider>,
        factor_provider: Arc<dyn FactorProvider>,
    ) -> Self {
        Self {
            price_provider,
            factor_provider,
            benchmark: DEFAULT_BENCHMARK.to_string(),
            quant_analyzer: QuantAnalysisEngine::new(),
        }
    }

    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = benchmark.into();
        self
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn price_provider_name(&self) -> &str {
        self.price_provider.name()
    }

    /// Any fetch failure (including `DataUnavailable`) fails the whole request.
    /// Degenerate models do not: they come back as warnings in the report.
    pub async fn estimate_expected_return(
        &self,
        request: &ExpectedReturnRequest,
    ) -> Result<ExpectedReturnReport, AnalysisError> {
        let ExpectedReturnRequest { ticker, start, end } = request;

        tracing::info!(
            ticker = %ticker,
            benchmark = %self.benchmark,
            %start,
            %end,
            provider = self.price_provider.name(),
            "Estimating expected return"
        );

        // The three fetches are independent; the first error cancels the rest.
        let (stock_prices, market_prices, factors) = tokio::try_join!(
            self.price_provider.fetch_daily_prices(ticker, *start, *end),
            self.price_provider.fetch_daily_prices(&self.benchmark, *start, *end),
            self.factor_provider.fetch_factor_panel(*start, *end),
        )
        .map_err(|e| {
            tracing::warn!(ticker = %ticker, error = %e, "Fetch stage failed");
            e
        })?;

        tracing::debug!(
            stock_days = stock_prices.len(),
            market_days = market_prices.len(),
            factor_months = factors.len(),
            "Fetch stage complete"
        );

        let report = self
            .quant_analyzer
            .analyze(&stock_prices, &market_prices, &factors);

        for warning in &report.warnings {
            tracing::warn!(
                ticker = %ticker,
                model = warning.model.label(),
                kind = %warning.kind,
                "{}",
                warning.reason
            );
        }
        tracing::info!(
            ticker = %ticker,
            observations = report.observations,
            capm = report.capm.is_some(),
            ff3 = report.ff3.is_some(),
            "Expected return estimated"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{FactorPanel, FactorRow, MonthEnd, PricePoint, PriceSeries};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticPrices {
        series: HashMap<String, Vec<PricePoint>>,
    }

    #[async_trait]
    impl PriceProvider for StaticPrices {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_daily_prices(
            &self,
            ticker: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<PriceSeries, AnalysisError> {
            let points: Vec<PricePoint> = self
                .series
                .get(ticker)
                .map(|p| p.iter().filter(|p| p.date >= start && p.date < end).copied().collect())
                .unwrap_or_default();
            if points.is_empty() {
                return Err(AnalysisError::data_unavailable(ticker, start, end));
            }
            Ok(PriceSeries::new(ticker, points))
        }
    }

    struct StaticFactors {
        rows: Vec<FactorRow>,
    }

    #[async_trait]
    impl FactorProvider for StaticFactors {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_factor_panel(
            &self,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<FactorPanel, AnalysisError> {
            let first = MonthEnd::containing(start);
            let last = MonthEnd::containing(end);
            let rows: Vec<FactorRow> = self
                .rows
                .iter()
                .filter(|r| r.month >= first && r.month <= last)
                .copied()
                .collect();
            if rows.is_empty() {
                return Err(AnalysisError::data_unavailable("F-F_Research_Data_Factors", start, end));
            }
            Ok(FactorPanel::new(rows))
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Two closes per month for 2021-2022 with a deterministic wobble.
    fn daily(base: f64, drift: f64) -> Vec<PricePoint> {
        let mut points = Vec::new();
        let mut price = base;
        for year in 2021..=2022 {
            for month in 1..=12u32 {
                for day in [5u32, 25] {
                    let wobble = ((month * 7 + day) % 11) as f64 / 1000.0 - 0.005;
                    price *= 1.0 + drift + wobble;
                    points.push(PricePoint { date: d(year, month, day), value: price });
                }
            }
        }
        points
    }

    fn factor_rows(years: std::ops::RangeInclusive<i32>) -> Vec<FactorRow> {
        years
            .flat_map(|y| (1..=12u32).map(move |m| (y, m)))
            .map(|(y, m)| FactorRow {
                month: MonthEnd::from_year_month(y, m).unwrap(),
                mkt_rf: ((m * 3) % 7) as f64 / 1000.0 - 0.003,
                smb: ((m * 5) % 9) as f64 / 1000.0 - 0.004,
                hml: ((m * 2) % 5) as f64 / 1000.0 - 0.002,
                rf: 0.001,
            })
            .collect()
    }

    fn orchestrator(factor_years: std::ops::RangeInclusive<i32>) -> AnalysisOrchestrator {
        let mut series = HashMap::new();
        series.insert("AAPL".to_string(), daily(100.0, 0.004));
        series.insert(DEFAULT_BENCHMARK.to_string(), daily(4000.0, 0.002));
        AnalysisOrchestrator::new(
            Arc::new(StaticPrices { series }),
            Arc::new(StaticFactors { rows: factor_rows(factor_years) }),
        )
    }

    #[test]
    fn test_request_validation() {
        let req = ExpectedReturnRequest::new(" aapl ", d(2020, 1, 1), d(2021, 1, 1)).unwrap();
        assert_eq!(req.ticker, "AAPL");
        assert!(ExpectedReturnRequest::new("", d(2020, 1, 1), d(2021, 1, 1)).is_err());
        assert!(ExpectedReturnRequest::new("AA PL", d(2020, 1, 1), d(2021, 1, 1)).is_err());
        assert!(ExpectedReturnRequest::new("AAPL", d(2021, 1, 1), d(2021, 1, 1)).is_err());
        assert!(ExpectedReturnRequest::new("^GSPC", d(2020, 1, 1), d(2021, 1, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_pipeline_produces_both_models() {
        let orch = orchestrator(2021..=2022);
        let req = ExpectedReturnRequest::new("AAPL", d(2021, 1, 1), d(2023, 1, 1)).unwrap();
        let report = orch.estimate_expected_return(&req).await.unwrap();

        assert_eq!(report.observations, 23);
        assert_eq!(report.benchmark, DEFAULT_BENCHMARK);
        assert!(report.capm.is_some());
        assert!(report.ff3.is_some());
        assert_eq!(report.start_month, Some(d(2021, 2, 28)));
        assert_eq!(report.end_month, Some(d(2022, 12, 31)));
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_data_unavailable() {
        let orch = orchestrator(2021..=2022);
        let req = ExpectedReturnRequest::new("NOPE", d(2021, 1, 1), d(2023, 1, 1)).unwrap();
        let err = orch.estimate_expected_return(&req).await.unwrap_err();
        match err {
            AnalysisError::DataUnavailable { ticker, start, end } => {
                assert_eq!(ticker, "NOPE");
                assert_eq!(start, d(2021, 1, 1));
                assert_eq!(end, d(2023, 1, 1));
            }
            other => panic!("expected DataUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_factor_range_fails_request() {
        let orch = orchestrator(2015..=2016);
        let req = ExpectedReturnRequest::new("AAPL", d(2021, 1, 1), d(2023, 1, 1)).unwrap();
        let err = orch.estimate_expected_return(&req).await.unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_short_overlap_degenerates_models_independently() {
        // Prices cover 2021-2022, factors only reach 2021; the request spans
        // a window where only two aligned months exist.
        let orch = orchestrator(2021..=2021);
        let req = ExpectedReturnRequest::new("AAPL", d(2021, 10, 1), d(2022, 3, 1)).unwrap();
        let report = orch.estimate_expected_return(&req).await.unwrap();

        assert_eq!(report.observations, 2);
        assert!(report.capm.is_some());
        assert!(report.ff3.is_none());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, "degenerate_fit");
    }

    #[tokio::test]
    async fn test_factor_months_outside_price_history_give_empty_panel() {
        // Factor data exists for the range but prices stop before it.
        let mut series = HashMap::new();
        series.insert("AAPL".to_string(), daily(100.0, 0.004));
        series.insert(DEFAULT_BENCHMARK.to_string(), daily(4000.0, 0.002));
        let mut rows = factor_rows(2023..=2023);
        rows.extend(factor_rows(2021..=2021).into_iter().take(1));
        let orch = AnalysisOrchestrator::new(
            Arc::new(StaticPrices { series }),
            Arc::new(StaticFactors { rows }),
        );
        let req = ExpectedReturnRequest::new("AAPL", d(2021, 1, 1), d(2023, 12, 31)).unwrap();
        let report = orch.estimate_expected_return(&req).await.unwrap();

        assert_eq!(report.observations, 0);
        assert!(report.capm.is_none());
        assert!(report.ff3.is_none());
        assert!(report.warnings.iter().all(|w| w.kind == "alignment_empty"));
    }
}
