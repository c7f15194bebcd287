use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical key for a calendar month: the month's last calendar day.
///
/// Every monthly series (price returns and factor rows) is keyed through
/// [`MonthEnd::containing`], so two independently fetched series for the same
/// month always produce equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthEnd(NaiveDate);

impl MonthEnd {
    pub fn containing(date: NaiveDate) -> Self {
        let last = date
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        MonthEnd(last)
    }

    pub fn from_year_month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::containing)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for MonthEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// One daily closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Daily price history for one symbol, dates strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts by date, keeps the last value reported for a date and drops
    /// non-finite or non-positive prices.
    pub fn new(symbol: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        points.retain(|p| p.value.is_finite() && p.value > 0.0);
        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }

        Self {
            symbol: symbol.into(),
            points: deduped,
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Fractional return for one month, keyed by month end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub month: MonthEnd,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturnSeries {
    pub symbol: String,
    pub returns: Vec<MonthlyReturn>,
}

impl MonthlyReturnSeries {
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// Monthly Fama-French research factors, as fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    pub month: MonthEnd,
    pub mkt_rf: f64,
    pub smb: f64,
    pub hml: f64,
    pub rf: f64,
}

impl FactorRow {
    pub fn is_complete(&self) -> bool {
        self.mkt_rf.is_finite() && self.smb.is_finite() && self.hml.is_finite() && self.rf.is_finite()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorPanel {
    rows: Vec<FactorRow>,
}

impl FactorPanel {
    /// Rows are sorted by month; a repeated month keeps its last row.
    pub fn new(mut rows: Vec<FactorRow>) -> Self {
        rows.sort_by_key(|r| r.month);
        let mut deduped: Vec<FactorRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match deduped.last_mut() {
                Some(last) if last.month == row.month => *last = row,
                _ => deduped.push(row),
            }
        }
        Self { rows: deduped }
    }

    pub fn rows(&self) -> &[FactorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One month with stock, market and factor returns all present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub month: MonthEnd,
    pub stock: f64,
    pub market: f64,
    pub mkt_rf: f64,
    pub smb: f64,
    pub hml: f64,
    pub rf: f64,
    pub excess_stock: f64,
    pub excess_market: f64,
}

/// Inner join of stock returns, market returns and factors. Chronological.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedPanel {
    pub rows: Vec<AlignedRow>,
}

impl AlignedPanel {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_month(&self) -> Option<MonthEnd> {
        self.rows.first().map(|r| r.month)
    }

    pub fn last_month(&self) -> Option<MonthEnd> {
        self.rows.last().map(|r| r.month)
    }

    fn column(&self, f: impl Fn(&AlignedRow) -> f64) -> Vec<f64> {
        self.rows.iter().map(f).collect()
    }

    pub fn excess_stock(&self) -> Vec<f64> {
        self.column(|r| r.excess_stock)
    }

    pub fn excess_market(&self) -> Vec<f64> {
        self.column(|r| r.excess_market)
    }

    pub fn mkt_rf(&self) -> Vec<f64> {
        self.column(|r| r.mkt_rf)
    }

    pub fn smb(&self) -> Vec<f64> {
        self.column(|r| r.smb)
    }

    pub fn hml(&self) -> Vec<f64> {
        self.column(|r| r.hml)
    }

    pub fn rf(&self) -> Vec<f64> {
        self.column(|r| r.rf)
    }
}

/// The two fixed model specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum FactorModel {
    Capm,
    Ff3,
}

impl FactorModel {
    /// Number of fitted coefficients, intercept included.
    pub fn parameter_count(&self) -> usize {
        match self {
            FactorModel::Capm => 2,
            FactorModel::Ff3 => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FactorModel::Capm => "CAPM",
            FactorModel::Ff3 => "Fama-French 3-factor",
        }
    }
}

/// CAPM estimate. `R2` is `NaN` (serialized as `null`) when the response is constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CapmEstimate {
    pub intercept: f64,
    pub beta: f64,
    pub expected_return_monthly: f64,
    pub expected_return_annual: f64,
    #[serde(rename = "R2")]
    pub r_squared: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Ff3Estimate {
    pub intercept: f64,
    pub beta_mkt: f64,
    pub beta_smb: f64,
    pub beta_hml: f64,
    pub expected_return_monthly: f64,
    pub expected_return_annual: f64,
    #[serde(rename = "R2")]
    pub r_squared: f64,
    pub observations: usize,
}

/// Why a model was omitted or returned with undefined diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelWarning {
    pub model: FactorModel,
    pub kind: String,
    pub reason: String,
}

/// Final output of one expected-return request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ExpectedReturnReport {
    pub ticker: String,
    pub benchmark: String,
    pub capm: Option<CapmEstimate>,
    pub ff3: Option<Ff3Estimate>,
    pub observations: usize,
    pub start_month: Option<NaiveDate>,
    pub end_month: Option<NaiveDate>,
    pub warnings: Vec<ModelWarning>,
}
