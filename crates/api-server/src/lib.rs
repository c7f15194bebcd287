pub mod config;
pub mod expected_return_routes;
pub mod middleware;

use analysis_core::{AnalysisError, FactorProvider, PriceProvider};
use analysis_orchestrator::AnalysisOrchestrator;
use anyhow::Context;
use axum::{
    error_handling::HandleErrorLayer,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Json, Router,
};
use french_client::FrenchLibraryClient;
use polygon_client::PolygonClient;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use yahoo_client::YahooClient;

use config::{PriceProviderKind, ServerConfig};

#[derive(OpenApi)]
#[openapi(
    info(title = "Expected Return API", description = "CAPM and Fama-French three-factor expected return estimates"),
    paths(expected_return_routes::calculate),
    components(schemas(
        expected_return_routes::CalculateRequest,
        analysis_core::ExpectedReturnReport,
        analysis_core::CapmEstimate,
        analysis_core::Ff3Estimate,
        analysis_core::ModelWarning,
        analysis_core::FactorModel,
    ))
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AnalysisOrchestrator>,
}

/// Error returned by handlers. Serialized as
/// `{"success": false, "error": ..., "kind": ..., ...details}`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    error: anyhow::Error,
    details: Option<Value>,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self {
            status,
            kind: "internal",
            error,
            details: None,
        }
    }

    pub fn bad_request(err: AnalysisError) -> Self {
        let kind = err.kind();
        Self::with_status(StatusCode::BAD_REQUEST, err.into()).with_kind(kind)
    }

    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        let kind = err.kind();
        let (status, details) = match &err {
            AnalysisError::DataUnavailable { ticker, start, end } => (
                StatusCode::NOT_FOUND,
                Some(json!({ "ticker": ticker, "start": start, "end": end })),
            ),
            AnalysisError::DegenerateFit(_) | AnalysisError::AlignmentEmpty => {
                (StatusCode::UNPROCESSABLE_ENTITY, None)
            }
            // Request input is validated before the pipeline runs, so anything
            // left here came from an upstream payload or transport.
            AnalysisError::InvalidData(_) | AnalysisError::ApiError(_) => {
                (StatusCode::BAD_GATEWAY, None)
            }
        };
        Self {
            status,
            kind,
            error: err.into(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, kind = self.kind, "Request failed: {:#}", self.error);
        } else {
            tracing::warn!(status = %self.status, kind = self.kind, "Request rejected: {}", self.error);
        }

        let mut body = json!({
            "success": false,
            "error": self.error.to_string(),
            "kind": self.kind,
        });
        if let (Some(Value::Object(extra)), Some(obj)) = (self.details, body.as_object_mut()) {
            obj.extend(extra);
        }

        (self.status, Json(body)).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "price_provider": state.orchestrator.price_provider_name(),
        "benchmark": state.orchestrator.benchmark(),
    }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::with_status(
            StatusCode::REQUEST_TIMEOUT,
            anyhow::anyhow!("Request deadline exceeded"),
        )
        .with_kind("timeout")
    } else {
        AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("Unhandled middleware error: {}", err),
        )
    }
}

/// CORS for the configured front-end origins. Credentials are allowed, so
/// methods and headers mirror the preflight instead of using a wildcard.
pub fn cors_layer(allowed_origins: &[String]) -> anyhow::Result<CorsLayer> {
    if allowed_origins.iter().any(|o| o == "*") {
        anyhow::bail!("ALLOWED_ORIGINS cannot contain '*' because credentials are allowed");
    }
    let origins = allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .with_context(|| format!("Invalid origin in ALLOWED_ORIGINS: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn build_router(state: AppState, cors: CorsLayer, request_timeout: Duration) -> Router {
    Router::new()
        .merge(expected_return_routes::expected_return_routes())
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(request_timeout),
        )
        .layer(axum::middleware::from_fn(middleware::security_headers_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}

/// Wires the configured price provider and the French library client into
/// an orchestrator. All providers share one HTTP client.
pub fn build_orchestrator(config: &ServerConfig) -> anyhow::Result<AnalysisOrchestrator> {
    let http = reqwest::Client::builder()
        .timeout(config.provider_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let price_provider: Arc<dyn PriceProvider> = match config.price_provider {
        PriceProviderKind::Yahoo => Arc::new(YahooClient::new(http.clone())),
        PriceProviderKind::Polygon => {
            let api_key = config
                .polygon_api_key
                .clone()
                .context("POLYGON_API_KEY must be set when PRICE_PROVIDER=polygon")?;
            Arc::new(
                PolygonClient::new(api_key, http.clone())
                    .with_rate_limit(config.polygon_rate_limit),
            )
        }
    };
    let factor_provider: Arc<dyn FactorProvider> =
        Arc::new(FrenchLibraryClient::new(http).with_url(config.ff_factors_url.clone()));

    Ok(AnalysisOrchestrator::new(price_provider, factor_provider)
        .with_benchmark(config.market_benchmark.clone()))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("api_server=info,analysis_orchestrator=info,tower_http=info")
    });

    let json_logs = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(
        provider = ?config.price_provider,
        benchmark = %config.market_benchmark,
        origins = ?config.allowed_origins,
        "Starting expected return API"
    );

    let orchestrator = build_orchestrator(&config)?;
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };
    let app = build_router(state, cors_layer(&config.allowed_origins)?, config.request_timeout);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
