//! Yahoo Finance chart API as a daily price source.

use analysis_core::{AnalysisError, PricePoint, PriceProvider, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::{header, Client};
use serde::Deserialize;

const BASE_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Daily history from `/v8/finance/chart`. Prefers the `adjclose` indicator and
/// falls back to the raw close when Yahoo omits it.
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Daily closes for `symbol` in `[start, end)`.
    pub async fn get_daily_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let period1 = unix_midnight(start).to_string();
        let period2 = unix_midnight(end).to_string();

        let response = self
            .client
            .get(&url)
            .header(header::USER_AGENT, USER_AGENT)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "div|split"),
                ("includeAdjustedClose", "true"),
            ])
            .send()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        // Unknown symbols (404) and ranges before listing (400) carry a chart
        // error body saying there is no data; both become an empty history.
        if !status.is_success() {
            if reports_no_data(&body) {
                return Ok(Vec::new());
            }
            return Err(AnalysisError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        parse_chart(&body)
    }
}

#[async_trait]
impl PriceProvider for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_daily_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AnalysisError> {
        let points = self.get_daily_history(ticker, start, end).await?;
        tracing::debug!(ticker, rows = points.len(), "Yahoo daily history fetched");

        let series = PriceSeries::new(ticker, points);
        if series.is_empty() {
            return Err(AnalysisError::data_unavailable(ticker, start, end));
        }
        Ok(series)
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl YahooChartError {
    /// "Not Found" for unknown symbols, "Data doesn't exist ..." for a range
    /// that ends before the symbol listed.
    fn is_no_data(&self) -> bool {
        self.code.eq_ignore_ascii_case("Not Found")
            || self
                .description
                .as_deref()
                .is_some_and(|d| d.starts_with("Data doesn't exist"))
    }
}

fn reports_no_data(body: &str) -> bool {
    serde_json::from_str::<YahooChartResponse>(body)
        .ok()
        .and_then(|r| r.chart.error)
        .is_some_and(|e| e.is_no_data())
}

/// Parse a chart payload into daily points. A no-data chart error yields an
/// empty list; any other chart error is an API error.
fn parse_chart(body: &str) -> Result<Vec<PricePoint>, AnalysisError> {
    let chart_response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::InvalidData(format!("failed to parse yahoo chart: {}", e)))?;

    if let Some(error) = chart_response.chart.error {
        if error.is_no_data() {
            return Ok(Vec::new());
        }
        return Err(AnalysisError::ApiError(format!(
            "yahoo chart API error: {} ({})",
            error.description.unwrap_or_default(),
            error.code
        )));
    }

    let Some(result) = chart_response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let timestamps = result.timestamp.unwrap_or_default();
    let gmt_offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

    let adjusted = result
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose);
    let closes = match adjusted {
        Some(values) => values,
        None => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    Ok(timestamps
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let value = close?;
            let local = DateTime::from_timestamp(ts + gmt_offset, 0)?;
            Some(PricePoint {
                date: local.date_naive(),
                value,
            })
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Deserialize)]
struct YahooChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
