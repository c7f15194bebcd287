//! Panel Aligner: inner join of stock returns, market returns and factors.

use std::collections::HashMap;

use analysis_core::{AlignedPanel, AlignedRow, FactorPanel, MonthEnd, MonthlyReturnSeries};

fn by_month(series: &MonthlyReturnSeries) -> HashMap<MonthEnd, f64> {
    series
        .returns
        .iter()
        .filter(|r| r.value.is_finite())
        .map(|r| (r.month, r.value))
        .collect()
}

/// Joins on exact [`MonthEnd`] equality and derives the excess-return columns.
///
/// A month missing from any input, or carrying a non-finite value in any of
/// the six input columns, is dropped. Output follows the factor panel's order,
/// which is chronological.
pub fn align(
    stock: &MonthlyReturnSeries,
    market: &MonthlyReturnSeries,
    factors: &FactorPanel,
) -> AlignedPanel {
    let stock_by_month = by_month(stock);
    let market_by_month = by_month(market);

    let rows = factors
        .rows()
        .iter()
        .filter(|f| f.is_complete())
        .filter_map(|f| {
            let stock = *stock_by_month.get(&f.month)?;
            let market = *market_by_month.get(&f.month)?;
            Some(AlignedRow {
                month: f.month,
                stock,
                market,
                mkt_rf: f.mkt_rf,
                smb: f.smb,
                hml: f.hml,
                rf: f.rf,
                excess_stock: stock - f.rf,
                excess_market: market - f.rf,
            })
        })
        .collect();

    AlignedPanel { rows }
}
