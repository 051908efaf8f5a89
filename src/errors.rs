use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::external::price_provider::PriceProviderError;

/// Failures raised by the optimization engine.
///
/// The engine never substitutes defaults for a failed computation; callers
/// decide how each kind is surfaced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Insufficient data for {ticker}: {observations} return observation(s), need at least 2")]
    InsufficientData { ticker: String, observations: usize },
    #[error("No price history found for {0}")]
    MissingAsset(String),
    #[error("Optimizer failed to satisfy constraints after {iterations} iterations (residual {residual:e})")]
    OptimizationDiverged { iterations: usize, residual: f64 },
    #[error("Invalid risk level '{0}': expected an integer between 1 and 10")]
    InvalidRiskLevel(String),
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),
    #[error("Invalid price series for {ticker}: {reason}")]
    InvalidSeries { ticker: String, reason: String },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EngineError {
    /// Machine-readable identifier used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InsufficientData { .. } => "insufficient_data",
            EngineError::MissingAsset(_) => "missing_asset",
            EngineError::OptimizationDiverged { .. } => "optimization_diverged",
            EngineError::InvalidRiskLevel(_) => "invalid_risk_level",
            EngineError::DegenerateInput(_) => "degenerate_input",
            EngineError::InvalidSeries { .. } => "invalid_series",
            EngineError::InvalidParameter(_) => "invalid_parameter",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
}

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    pub kind: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Engine(e) => e.kind(),
            AppError::Validation(_) => "validation",
            AppError::RateLimited => "rate_limited",
            AppError::External(_) => "external",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) => match e {
                EngineError::MissingAsset(_) => StatusCode::NOT_FOUND,
                EngineError::OptimizationDiverged { .. } | EngineError::DegenerateInput(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::BAD_REQUEST,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::External(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = ErrorPayload {
            message: self.to_string(),
            kind: self.kind().to_string(),
        };

        match self {
            AppError::RateLimited => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (status, headers, Json(payload)).into_response()
            }
            _ => (status, Json(payload)).into_response(),
        }
    }
}

impl From<PriceProviderError> for AppError {
    fn from(value: PriceProviderError) -> Self {
        match value {
            PriceProviderError::NotFound(ticker) => AppError::Engine(EngineError::MissingAsset(ticker)),
            PriceProviderError::RateLimited => AppError::RateLimited,
            other => AppError::External(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kinds_are_stable() {
        assert_eq!(EngineError::MissingAsset("X".into()).kind(), "missing_asset");
        assert_eq!(EngineError::InvalidRiskLevel("11".into()).kind(), "invalid_risk_level");
        assert_eq!(
            EngineError::OptimizationDiverged { iterations: 3, residual: 0.1 }.kind(),
            "optimization_diverged"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::from(EngineError::MissingAsset("X".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(EngineError::DegenerateInput("flat".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(EngineError::InvalidRiskLevel("0".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_provider_not_found_becomes_missing_asset() {
        let err = AppError::from(PriceProviderError::NotFound("ZZZZ".into()));
        assert_eq!(err.kind(), "missing_asset");

        let err = AppError::from(PriceProviderError::Network("timeout".into()));
        assert_eq!(err.kind(), "external");
    }
}
