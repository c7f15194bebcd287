//! Monthly Return Transformer: daily closes to month-over-month returns.

use analysis_core::{MonthEnd, MonthlyReturn, MonthlyReturnSeries, PriceSeries};

/// Last close of each calendar month, in chronological order.
pub fn month_end_prices(prices: &PriceSeries) -> Vec<(MonthEnd, f64)> {
    let mut month_ends: Vec<(MonthEnd, f64)> = Vec::new();
    for point in prices.points() {
        let month = MonthEnd::containing(point.date);
        match month_ends.last_mut() {
            Some((last_month, last_value)) if *last_month == month => *last_value = point.value,
            _ => month_ends.push((month, point.value)),
        }
    }
    month_ends
}

/// Month-over-month returns keyed by [`MonthEnd`].
///
/// The first month has no prior close and is dropped, so the output holds one
/// entry fewer than the number of distinct months. Fewer than two months yields
/// an empty series.
pub fn to_monthly_returns(prices: &PriceSeries) -> MonthlyReturnSeries {
    let month_ends = month_end_prices(prices);

    let returns = month_ends
        .windows(2)
        .map(|w| MonthlyReturn {
            month: w[1].0,
            value: w[1].1 / w[0].1 - 1.0,
        })
        .collect();

    MonthlyReturnSeries {
        symbol: prices.symbol.clone(),
        returns,
    }
}
