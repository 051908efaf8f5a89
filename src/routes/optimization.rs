use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{PortfolioRequest, PortfolioResponse};
use crate::services::portfolio_service;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/optimize", post(optimize_portfolio))
}

/// POST /api/portfolio/optimize
///
/// Compute max-Sharpe weights, the efficient frontier and, when `risk_level`
/// is present, the risk-matched portfolio for a basket of tickers.
///
/// Example body:
/// `{"tickers": ["AAPL", "MSFT"], "start_date": "2022-01-01", "end_date": "2023-12-31", "risk_level": 6}`
pub async fn optimize_portfolio(
    State(state): State<AppState>,
    body: Result<Json<PortfolioRequest>, JsonRejection>,
) -> Result<Json<PortfolioResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    info!(
        "POST /api/portfolio/optimize - {} ticker(s) from {} to {}",
        request.tickers.len(),
        request.start_date,
        request.end_date
    );

    portfolio_service::compute_portfolio(state.price_provider.as_ref(), &state.engine, request)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Portfolio optimization failed: {}", e);
            e
        })
}
