use ndarray::{Array1, Array2};
use tracing::info;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::models::{Frontier, FrontierPoint, RiskLevel, WeightBounds};
use crate::services::frontier_service::frontier_point;

/// Target return for a risk level.
///
/// Levels 1..=5 interpolate from the minimum-variance return to the tangency
/// return; levels 6..=10 continue from the tangency return to `max_return`.
pub fn risk_target_return(risk: RiskLevel, min_variance: f64, tangency: f64, max_return: f64) -> f64 {
    let level = risk.value() as f64;
    if level <= 5.0 {
        let scale = (level - 1.0) / 4.0;
        min_variance + scale * (tangency - min_variance)
    } else {
        let scale = (level - 5.0) / 5.0;
        tangency + scale * (max_return - tangency)
    }
}

/// Frontier point whose achieved return is nearest to `target` (first on ties).
pub fn nearest_point(points: &[FrontierPoint], target: f64) -> Option<&FrontierPoint> {
    points.iter().fold(None, |best: Option<&FrontierPoint>, p| match best {
        Some(b) if (b.achieved_return - target).abs() <= (p.achieved_return - target).abs() => Some(b),
        _ => Some(p),
    })
}

/// Resolve a risk level to a portfolio on the frontier.
///
/// The interpolated target is snapped to the nearest precomputed frontier
/// point, then weights are re-solved with that point's achieved return as an
/// exact target so the reported weights, return and volatility agree.
pub fn map_risk_to_portfolio(
    risk: RiskLevel,
    frontier: &Frontier,
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    bounds: WeightBounds,
    config: &EngineConfig,
) -> Result<FrontierPoint, EngineError> {
    let target = risk_target_return(
        risk,
        frontier.min_variance.achieved_return,
        frontier.tangency.achieved_return,
        frontier.max_return,
    );

    let snapped = nearest_point(&frontier.points, target)
        .ok_or_else(|| EngineError::DegenerateInput("empty frontier".to_string()))?;

    info!(
        "Risk level {} -> target {:.6}, snapped to frontier return {:.6}",
        risk, target, snapped.achieved_return
    );

    frontier_point(
        expected_returns,
        covariance,
        snapped.achieved_return,
        bounds,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::frontier_service::build_frontier;
    use ndarray::array;

    fn level(v: i64) -> RiskLevel {
        RiskLevel::new(v).unwrap()
    }

    #[test]
    fn test_interpolation_anchors() {
        assert_eq!(risk_target_return(level(1), 0.06, 0.10, 0.15), 0.06);
        assert!((risk_target_return(level(5), 0.06, 0.10, 0.15) - 0.10).abs() < 1e-15);
        assert!((risk_target_return(level(10), 0.06, 0.10, 0.15) - 0.15).abs() < 1e-15);
        assert!((risk_target_return(level(3), 0.06, 0.10, 0.15) - 0.08).abs() < 1e-15);
        assert!((risk_target_return(level(8), 0.06, 0.10, 0.15) - 0.13).abs() < 1e-15);
    }

    #[test]
    fn test_nearest_point_prefers_first_on_tie() {
        let point = |r: f64| FrontierPoint {
            target_return: r,
            achieved_return: r,
            volatility: 0.1,
            weights: vec![1.0],
        };
        let points = vec![point(0.05), point(0.07), point(0.09)];
        assert_eq!(nearest_point(&points, 0.08).unwrap().achieved_return, 0.07);
        assert_eq!(nearest_point(&points, 0.2).unwrap().achieved_return, 0.09);
        assert!(nearest_point(&[], 0.1).is_none());
    }

    #[test]
    fn test_risk_levels_map_onto_frontier() {
        let mu = array![0.05, 0.10, 0.15];
        let cov = array![[0.02, 0.005, 0.001], [0.005, 0.04, 0.01], [0.001, 0.01, 0.09]];
        let config = EngineConfig::default();
        let bounds = WeightBounds::LONG_ONLY;
        let frontier = build_frontier(&mu, &cov, 12, bounds, &config).unwrap();

        let conservative = map_risk_to_portfolio(level(1), &frontier, &mu, &cov, bounds, &config).unwrap();
        assert!((conservative.achieved_return - frontier.min_variance.achieved_return).abs() < 1e-6);

        let balanced = map_risk_to_portfolio(level(5), &frontier, &mu, &cov, bounds, &config).unwrap();
        assert!((balanced.achieved_return - frontier.tangency.achieved_return).abs() < 1e-6);

        let aggressive = map_risk_to_portfolio(level(10), &frontier, &mu, &cov, bounds, &config).unwrap();
        assert!((aggressive.achieved_return - frontier.max_return).abs() < 1e-6);

        for p in [&conservative, &balanced, &aggressive] {
            let sum: f64 = p.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert!(conservative.volatility <= aggressive.volatility);
    }
}
