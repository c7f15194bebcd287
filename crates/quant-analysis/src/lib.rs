//! Monthly return alignment and factor regressions (CAPM, Fama-French 3).

pub mod models;
pub mod panel;
pub mod regression;
pub mod report;
pub mod returns;

pub use models::{annualize_monthly, fit_capm, fit_ff3};
pub use panel::align;
pub use regression::{fit_ols, OlsFit};
pub use report::assemble_report;
pub use returns::to_monthly_returns;

use analysis_core::{ExpectedReturnReport, FactorPanel, PriceSeries};

/// Runs transform, align, both regressions and assembly over fetched series.
pub struct QuantAnalysisEngine;

impl QuantAnalysisEngine {
    pub fn new() -> Self {
        Self
    }

    /// Pure computation over already-fetched data. Degenerate models are
    /// reported as warnings; this never fails.
    pub fn analyze(
        &self,
        stock_prices: &PriceSeries,
        market_prices: &PriceSeries,
        factors: &FactorPanel,
    ) -> ExpectedReturnReport {
        let stock = to_monthly_returns(stock_prices);
        let market = to_monthly_returns(market_prices);
        let panel = align(&stock, &market, factors);

        let capm = fit_capm(&panel);
        let ff3 = fit_ff3(&panel);

        assemble_report(
            &stock_prices.symbol,
            &market_prices.symbol,
            &panel,
            capm,
            ff3,
        )
    }
}

impl Default for QuantAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}
