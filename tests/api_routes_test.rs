//! HTTP surface exercised in-process through the router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use optifolio_backend::app::create_app;
use optifolio_backend::config::EngineConfig;
use optifolio_backend::external::price_provider::StaticPriceProvider;
use optifolio_backend::state::AppState;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

fn app() -> Router {
    app_with(EngineConfig::default())
}

fn app_with(engine: EngineConfig) -> Router {
    let recent = Utc::now().date_naive() - Duration::days(20);
    let provider = StaticPriceProvider::new()
        .with_random_walk("AAA", start(), 11, 0.0005, 0.02, 300)
        .with_random_walk("BBB", start(), 12, 0.0009, 0.05, 300)
        .with_random_walk("LATE", start() + Duration::days(90), 13, 0.0003, 0.01, 200)
        .with_daily_closes("FRESH", recent, &[10.0, 10.5, 10.2]);

    create_app(AppState {
        price_provider: Arc::new(provider),
        engine,
    })
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    send_to(app(), request).await
}

async fn send_to(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["frontier_points"], 12);
}

#[tokio::test]
async fn test_optimize_with_risk_level() {
    let (status, body) = send(post_json(
        "/api/portfolio/optimize",
        json!({
            "tickers": ["AAA", "BBB"],
            "start_date": "2023-01-01",
            "end_date": "2023-12-31",
            "risk_level": "7"
        }),
    ))
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["tickers"], json!(["AAA", "BBB"]));
    assert_eq!(body["frontier"].as_array().unwrap().len(), 12);
    assert!(body["frontier"][0]["return"].is_number());
    assert!(body["tangency"]["weights"].is_array());
    assert!(body["optimal_portfolio"]["volatility"].is_number());
    assert_eq!(body["per_asset_stats"][1]["ticker"], "BBB");

    let sum: f64 = body["weights"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w.as_f64().unwrap())
        .sum();
    assert!((sum - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_optimize_without_risk_level_omits_optimal_portfolio() {
    let (status, body) = send(post_json(
        "/api/portfolio/optimize",
        json!({"tickers": ["AAA", "BBB"], "start_date": "2023-01-01", "end_date": "2023-12-31"}),
    ))
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("optimal_portfolio").is_none());
}

#[tokio::test]
async fn test_optimize_error_payloads() {
    let (status, body) = send(post_json(
        "/api/portfolio/optimize",
        json!({"tickers": ["AAA", "ZZZ"], "start_date": "2023-01-01", "end_date": "2023-12-31"}),
    ))
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "missing_asset");
    assert!(body["message"].as_str().unwrap().contains("ZZZ"));

    let (status, body) = send(post_json(
        "/api/portfolio/optimize",
        json!({"tickers": ["AAA", "BBB"], "start_date": "2023-01-01", "end_date": "2023-12-31", "risk_level": "high"}),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_risk_level");

    let (status, body) = send(post_json("/api/portfolio/optimize", json!({"tickers": ["AAA"]}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_exhausted_solver_budget_is_unprocessable() {
    let starved = EngineConfig {
        max_iterations: 1,
        max_inner_iterations: 1,
        ..EngineConfig::default()
    };
    let (status, body) = send_to(
        app_with(starved),
        post_json(
            "/api/portfolio/optimize",
            json!({"tickers": ["AAA", "BBB"], "start_date": "2023-01-01", "end_date": "2023-12-31"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
    assert_eq!(body["kind"], "optimization_diverged");
}

#[tokio::test]
async fn test_validate_ticker() {
    let (status, body) = send(get("/api/stocks/fresh/validate")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticker"], "FRESH");
    assert_eq!(body["valid"], true);

    let (_, body) = send(get("/api/stocks/WAYTOOLONGTICKER/validate")).await;
    assert_eq!(body["valid"], false);

    let (_, body) = send(get("/api/stocks/AAA/validate")).await;
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn test_coverage_report() {
    let (status, body) = send(post_json(
        "/api/stocks/coverage",
        json!({"tickers": ["AAA", "LATE", "NOPE"], "start_date": "2023-01-02", "end_date": "2023-06-30"}),
    ))
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["all_covered"], false);
    let missing: Vec<&str> = body["missing"]
        .as_array()
        .unwrap()
        .iter()
        .map(|gap| gap["ticker"].as_str().unwrap())
        .collect();
    assert_eq!(missing, vec!["LATE", "NOPE"]);
}
