use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceProviderKind {
    Yahoo,
    Polygon,
}

impl PriceProviderKind {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "polygon" => Ok(Self::Polygon),
            other => bail!("PRICE_PROVIDER must be 'yahoo' or 'polygon', got '{}'", other),
        }
    }

    /// Index ticker for Yahoo, ETF proxy for Polygon (no index aggregates on the basic tier).
    pub fn default_benchmark(&self) -> &'static str {
        match self {
            Self::Yahoo => "^GSPC",
            Self::Polygon => "SPY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub price_provider: PriceProviderKind,
    pub polygon_api_key: Option<String>,
    pub polygon_rate_limit: usize,
    pub market_benchmark: String,
    pub ff_factors_url: String,
    pub provider_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let price_provider = match var("PRICE_PROVIDER") {
            Some(v) => PriceProviderKind::parse(&v)?,
            None => PriceProviderKind::Yahoo,
        };

        let polygon_api_key = var("POLYGON_API_KEY");
        if price_provider == PriceProviderKind::Polygon && polygon_api_key.is_none() {
            bail!("POLYGON_API_KEY must be set when PRICE_PROVIDER=polygon");
        }

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "PORT", 3001)?,
            allowed_origins,
            price_provider,
            polygon_api_key,
            polygon_rate_limit: parse_or(&var, "POLYGON_RATE_LIMIT", 500)?,
            market_benchmark: var("MARKET_BENCHMARK")
                .unwrap_or_else(|| price_provider.default_benchmark().to_string()),
            ff_factors_url: var("FF_FACTORS_URL")
                .unwrap_or_else(|| french_client::DEFAULT_FACTORS_URL.to_string()),
            provider_timeout: Duration::from_secs(parse_or(&var, "PROVIDER_TIMEOUT_SECS", 30)?),
            request_timeout: Duration::from_secs(parse_or(&var, "REQUEST_TIMEOUT_SECS", 120)?),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} has invalid value '{}'", key, v)),
        None => Ok(default),
    }
}
