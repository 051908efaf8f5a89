use futures::future::join_all;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{AppError, EngineError};
use crate::external::price_provider::{into_series, PriceProvider, PriceProviderError};
use crate::models::{
    AssetSeries, FrontierCurvePoint, PortfolioRequest, PortfolioResponse, ReturnConstraint,
    RiskLevel,
};
use crate::services::frontier_service::build_frontier;
use crate::services::optimization_service::optimize;
use crate::services::risk_mapping_service::map_risk_to_portfolio;
use crate::services::statistics_service::estimate;

/// Trim, uppercase and de-duplicate tickers, keeping first-seen order.
pub fn normalize_tickers(tickers: &[String]) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let ticker = raw.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(AppError::Validation("Ticker symbols must not be empty".to_string()));
        }
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }

    if out.is_empty() {
        return Err(AppError::Validation("At least one ticker is required".to_string()));
    }
    Ok(out)
}

/// Response for a one-asset basket: everything in that asset, no frontier.
pub fn single_asset_response(ticker: String) -> PortfolioResponse {
    PortfolioResponse {
        tickers: vec![ticker],
        weights: vec![1.0],
        frontier: Vec::new(),
        tangency: None,
        min_variance: None,
        optimal_portfolio: None,
        per_asset_stats: Vec::new(),
        correlation: Vec::new(),
    }
}

/// Run the synchronous engine over already materialized price series.
///
/// Estimates statistics, solves the maximum return/volatility weights, builds
/// the frontier and, when a risk level is given, resolves the risk-matched
/// portfolio.
pub fn run_engine(
    series: &[AssetSeries],
    risk_level: Option<RiskLevel>,
    config: &EngineConfig,
) -> Result<PortfolioResponse, EngineError> {
    if let [only] = series {
        return Ok(single_asset_response(only.ticker.clone()));
    }

    let bounds = config.bounds();
    let stats = estimate(series, config.trading_days)?;
    let mu = &stats.expected_returns;
    let sigma = &stats.covariance;

    let weights = optimize(mu, sigma, ReturnConstraint::Unconstrained, bounds, config)?;
    let frontier = build_frontier(mu, sigma, config.frontier_points, bounds, config)?;

    let optimal_portfolio = risk_level
        .map(|risk| map_risk_to_portfolio(risk, &frontier, mu, sigma, bounds, config))
        .transpose()?
        .map(|p| p.summary());

    Ok(PortfolioResponse {
        tickers: stats.tickers.clone(),
        weights,
        frontier: frontier
            .points
            .iter()
            .map(|p| FrontierCurvePoint {
                expected_return: p.achieved_return,
                volatility: p.volatility,
            })
            .collect(),
        tangency: Some(frontier.tangency.summary()),
        min_variance: Some(frontier.min_variance.summary()),
        optimal_portfolio,
        per_asset_stats: stats.per_asset_stats(),
        correlation: stats.correlation_rows(),
    })
}

/// Fetch every ticker's history concurrently.
pub async fn fetch_series(
    provider: &dyn PriceProvider,
    tickers: &[String],
    request: &PortfolioRequest,
) -> Result<Vec<AssetSeries>, AppError> {
    let fetches = tickers
        .iter()
        .map(|ticker| provider.fetch_history(ticker, request.start_date, request.end_date));
    let results = join_all(fetches).await;

    tickers
        .iter()
        .zip(results)
        .map(|(ticker, result)| match result {
            Ok(points) => Ok(into_series(ticker, points)?),
            Err(PriceProviderError::NotFound(_)) => {
                warn!("No price history for {}", ticker);
                Err(AppError::Engine(EngineError::MissingAsset(ticker.clone())))
            }
            Err(e) => Err(AppError::from(e)),
        })
        .collect()
}

/// Portfolio computation entry point used by the web layer.
pub async fn compute_portfolio(
    provider: &dyn PriceProvider,
    config: &EngineConfig,
    request: PortfolioRequest,
) -> Result<PortfolioResponse, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("portfolio", %request_id);

    compute_portfolio_inner(provider, config, request)
        .instrument(span)
        .await
}

async fn compute_portfolio_inner(
    provider: &dyn PriceProvider,
    config: &EngineConfig,
    request: PortfolioRequest,
) -> Result<PortfolioResponse, AppError> {
    let tickers = normalize_tickers(&request.tickers)?;
    if request.start_date >= request.end_date {
        return Err(AppError::Validation(format!(
            "start_date {} must be before end_date {}",
            request.start_date, request.end_date
        )));
    }

    let risk_level = request
        .risk_level
        .as_ref()
        .map(|raw| raw.resolve())
        .transpose()?;

    if let [only] = tickers.as_slice() {
        info!("Single ticker {} requested, skipping optimization", only);
        return Ok(single_asset_response(only.clone()));
    }

    let config = config.with_short_selling(request.allow_short);
    info!(
        "Optimizing {} tickers from {} to {} (risk level {:?}, short selling {})",
        tickers.len(),
        request.start_date,
        request.end_date,
        risk_level.map(|r| r.value()),
        config.allow_short
    );

    let series = fetch_series(provider, &tickers, &request).await?;
    let response = run_engine(&series, risk_level, &config)?;

    info!(
        "✅ Optimization complete: {} frontier points, optimal portfolio {}",
        response.frontier.len(),
        if response.optimal_portfolio.is_some() { "included" } else { "not requested" }
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::price_provider::StaticPriceProvider;
    use crate::models::{PricePoint, RiskLevelInput};
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn provider() -> StaticPriceProvider {
        StaticPriceProvider::new()
            .with_random_walk("AAA", start(), 1, 0.0004, 0.02, 250)
            .with_random_walk("BBB", start(), 2, 0.0008, 0.04, 250)
            .with_random_walk("CCC", start(), 3, 0.0002, 0.01, 250)
    }

    fn request(tickers: &[&str], risk: Option<RiskLevelInput>) -> PortfolioRequest {
        PortfolioRequest {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            start_date: start(),
            end_date: start() + Duration::days(400),
            risk_level: risk,
            allow_short: None,
        }
    }

    #[test]
    fn test_normalize_tickers() {
        let raw = vec![" aapl".to_string(), "MSFT".to_string(), "AAPL ".to_string()];
        assert_eq!(normalize_tickers(&raw).unwrap(), vec!["AAPL", "MSFT"]);
        assert!(normalize_tickers(&[]).is_err());
        assert!(normalize_tickers(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_run_engine_single_series_bypasses_estimation() {
        // A one-point series would fail estimation, so success proves the bypass
        let series = AssetSeries::new("ONLY", vec![PricePoint::new(start(), 10.0)]).unwrap();
        let response = run_engine(&[series], None, &EngineConfig::default()).unwrap();
        assert_eq!(response.weights, vec![1.0]);
        assert!(response.frontier.is_empty());
    }

    #[tokio::test]
    async fn test_single_ticker_never_fetches() {
        // The provider has no data for this ticker; fetching would fail
        let provider = StaticPriceProvider::new();
        let response = compute_portfolio(&provider, &EngineConfig::default(), request(&["solo"], None))
            .await
            .unwrap();

        assert_eq!(response.tickers, vec!["SOLO"]);
        assert_eq!(response.weights, vec![1.0]);
        assert!(response.frontier.is_empty());
        assert!(response.tangency.is_none());
    }

    #[tokio::test]
    async fn test_full_portfolio_with_risk_level() {
        let response = compute_portfolio(
            &provider(),
            &EngineConfig::default(),
            request(&["AAA", "BBB", "CCC"], Some(RiskLevelInput::Integer(5))),
        )
        .await
        .unwrap();

        assert_eq!(response.tickers, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(response.frontier.len(), 12);
        assert_eq!(response.per_asset_stats.len(), 3);
        assert_eq!(response.correlation.len(), 3);

        let sum: f64 = response.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);

        let optimal = response.optimal_portfolio.unwrap();
        let tangency = response.tangency.unwrap();
        assert!((optimal.expected_return - tangency.expected_return).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_ticker_is_reported() {
        let err = compute_portfolio(&provider(), &EngineConfig::default(), request(&["AAA", "NOPE"], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing_asset");
    }

    #[tokio::test]
    async fn test_invalid_risk_level_rejected_before_fetch() {
        let err = compute_portfolio(
            &StaticPriceProvider::new(),
            &EngineConfig::default(),
            request(&["AAA", "BBB"], Some(RiskLevelInput::Integer(11))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_risk_level");
    }

    #[tokio::test]
    async fn test_reversed_dates_rejected() {
        let mut req = request(&["AAA", "BBB"], None);
        std::mem::swap(&mut req.start_date, &mut req.end_date);

        let err = compute_portfolio(&provider(), &EngineConfig::default(), req).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
