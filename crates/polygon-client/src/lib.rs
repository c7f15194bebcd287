use analysis_core::{AnalysisError, PricePoint, PriceProvider, PriceSeries};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";
const DEFAULT_RATE_LIMIT: usize = 500;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now),
                None => Duration::ZERO,
            } + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Polygon.io daily aggregates as a [`PriceProvider`].
///
/// Aggregates are requested with `adjusted=true`, so the close is split and
/// dividend adjusted.
#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

impl PolygonClient {
    pub fn new(api_key: String, client: Client) -> Self {
        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(DEFAULT_RATE_LIMIT, Duration::from_secs(60)),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Requests per minute. Free tier users should use 5.
    pub fn with_rate_limit(mut self, per_minute: usize) -> Self {
        self.rate_limiter = RateLimiter::new(per_minute, Duration::from_secs(60));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        let request = builder.build().map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request.try_clone()
                .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await
                .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(AnalysisError::ApiError("Rate limited by Polygon after 3 retries".to_string()))
    }

    /// Daily adjusted aggregates for `symbol` in `[start, end)`.
    pub async fn get_daily_aggregates(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError> {
        // Polygon's range is inclusive on both ends.
        let last_day = end.checked_sub_days(Days::new(1)).unwrap_or(end);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            start.format("%Y-%m-%d"),
            last_day.format("%Y-%m-%d")
        );

        let response = self.send_request(
            self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ])
        ).await?;

        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        Ok(aggregates_to_points(parse_aggregates(&body)?.results))
    }
}

#[async_trait]
impl PriceProvider for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    async fn fetch_daily_prices(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AnalysisError> {
        let points = self.get_daily_aggregates(ticker, start, end).await?;
        tracing::debug!(ticker, rows = points.len(), "Polygon daily aggregates fetched");

        let series = PriceSeries::new(ticker, points);
        if series.is_empty() {
            return Err(AnalysisError::data_unavailable(ticker, start, end));
        }
        Ok(series)
    }
}

fn parse_aggregates(body: &str) -> Result<AggregateResponse, AnalysisError> {
    serde_json::from_str(body)
        .map_err(|e| AnalysisError::InvalidData(format!("failed to parse polygon aggregates: {}", e)))
}

/// Daily bars are stamped at midnight New York time, which is the same
/// calendar date in UTC.
fn aggregates_to_points(results: Vec<AggregateResult>) -> Vec<PricePoint> {
    results
        .into_iter()
        .filter_map(|r| {
            let timestamp = DateTime::from_timestamp_millis(r.t)?;
            Some(PricePoint {
                date: timestamp.date_naive(),
                value: r.c,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    c: f64, // close
}
