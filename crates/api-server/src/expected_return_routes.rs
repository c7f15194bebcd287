use analysis_core::ExpectedReturnReport;
use analysis_orchestrator::ExpectedReturnRequest;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{AppError, AppState};

/// Body posted by the front end. Dates are `YYYY-MM-DD`; the end date is exclusive.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRequest {
    pub ticker: String,
    pub start_date: String,
    pub end_date: String,
}

impl CalculateRequest {
    fn validate(&self) -> Result<ExpectedReturnRequest, AppError> {
        let start = parse_date("startDate", &self.start_date)?;
        let end = parse_date("endDate", &self.end_date)?;
        ExpectedReturnRequest::new(&self.ticker, start, end).map_err(AppError::bad_request)
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("{} must be a YYYY-MM-DD date, got '{}'", field, value),
        )
        .with_kind("invalid_data")
    })
}

pub fn expected_return_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate", post(calculate))
        .route("/", post(calculate))
}

#[utoipa::path(
    post,
    path = "/calculate",
    request_body = CalculateRequest,
    responses(
        (status = 200, description = "CAPM and Fama-French three-factor estimates", body = ExpectedReturnReport),
        (status = 400, description = "Invalid ticker or date range"),
        (status = 404, description = "No price or factor data for the range"),
        (status = 502, description = "Upstream data provider failed"),
        (status = 408, description = "Request deadline exceeded")
    ),
    tag = "Expected Return"
)]
pub(crate) async fn calculate(
    State(state): State<AppState>,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<ExpectedReturnReport>, AppError> {
    let Json(body) = body.map_err(|rejection| {
        AppError::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(rejection.body_text()))
            .with_kind("invalid_data")
    })?;
    let request = body.validate()?;

    let report = state.orchestrator.estimate_expected_return(&request).await?;
    Ok(Json(report))
}
