use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{CoverageReport, CoverageRequest, StockValidity};
use crate::services::validation_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:ticker/validate", get(validate_stock))
        .route("/coverage", post(check_coverage))
}

pub async fn validate_stock(
    Path(ticker): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<StockValidity>, AppError> {
    info!("GET /api/stocks/{}/validate - Checking ticker", ticker);
    validation_service::check_stock_validity(state.price_provider.as_ref(), &ticker)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Failed to validate {}: {}", ticker, e);
            e
        })
}

pub async fn check_coverage(
    State(state): State<AppState>,
    body: Result<Json<CoverageRequest>, JsonRejection>,
) -> Result<Json<CoverageReport>, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    info!(
        "POST /api/stocks/coverage - {} ticker(s) from {} to {}",
        request.tickers.len(),
        request.start_date,
        request.end_date
    );

    validation_service::check_date_coverage(
        state.price_provider.as_ref(),
        &request.tickers,
        request.start_date,
        request.end_date,
    )
    .await
    .map(Json)
    .map_err(|e| {
        error!("Coverage check failed: {}", e);
        e
    })
}
