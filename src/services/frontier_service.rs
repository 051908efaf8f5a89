//! Efficient frontier builder
//!
//! Sweeps evenly spaced target returns between the lowest and highest
//! single-asset expected return and solves a minimum-volatility problem at
//! each one.
use ndarray::{Array1, Array2};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::models::{Frontier, FrontierPoint, ReturnConstraint, WeightBounds};
use crate::services::optimization_service::{optimize, portfolio_return, portfolio_volatility};

/// Build a frontier of `point_count` points and derive its minimum-variance
/// and tangency (zero risk-free rate) portfolios.
///
/// The sweep range is the single-asset return range, not the portfolio-level
/// achievable range; extreme targets that are infeasible under the weight
/// bounds resolve to the optimizer's best feasible approximation.
pub fn build_frontier(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    point_count: usize,
    bounds: WeightBounds,
    config: &EngineConfig,
) -> Result<Frontier, EngineError> {
    if point_count == 0 {
        return Err(EngineError::InvalidParameter(
            "frontier needs at least one point".to_string(),
        ));
    }
    if expected_returns.is_empty() {
        return Err(EngineError::InvalidParameter("no assets for frontier".to_string()));
    }

    let min_return = expected_returns.fold(f64::INFINITY, |a, &b| a.min(b));
    let max_return = expected_returns.fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let targets = target_returns(min_return, max_return, point_count);
    let mut points = Vec::with_capacity(point_count);

    for target in targets {
        let point = frontier_point(expected_returns, covariance, target, bounds, config)?;
        debug!(
            "Frontier point target={:.6} achieved={:.6} volatility={:.6}",
            point.target_return, point.achieved_return, point.volatility
        );
        points.push(point);
    }

    let min_variance = select_min_variance(&points)?;
    let tangency = select_tangency(&points)?;

    info!(
        "Built frontier with {} points: min variance vol={:.4}, tangency return={:.4}",
        points.len(),
        min_variance.volatility,
        tangency.achieved_return
    );

    Ok(Frontier {
        points,
        min_variance,
        tangency,
        max_return,
    })
}

/// Solve the minimum-volatility portfolio for one target and measure it.
pub fn frontier_point(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    target: f64,
    bounds: WeightBounds,
    config: &EngineConfig,
) -> Result<FrontierPoint, EngineError> {
    let weights = optimize(
        expected_returns,
        covariance,
        ReturnConstraint::TargetReturn(target),
        bounds,
        config,
    )?;

    Ok(FrontierPoint {
        target_return: target,
        achieved_return: portfolio_return(&weights, expected_returns),
        volatility: portfolio_volatility(&weights, covariance),
        weights,
    })
}

/// `count` evenly spaced values from `low` to `high` inclusive.
fn target_returns(low: f64, high: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![low];
    }
    let step = (high - low) / (count - 1) as f64;
    (0..count)
        .map(|i| if i == count - 1 { high } else { low + step * i as f64 })
        .collect()
}

fn select_min_variance(points: &[FrontierPoint]) -> Result<FrontierPoint, EngineError> {
    points
        .iter()
        .fold(None::<&FrontierPoint>, |best, p| match best {
            Some(b) if b.volatility <= p.volatility => Some(b),
            _ => Some(p),
        })
        .cloned()
        .ok_or_else(|| EngineError::DegenerateInput("empty frontier".to_string()))
}

/// Highest return/volatility among points with non-zero volatility.
fn select_tangency(points: &[FrontierPoint]) -> Result<FrontierPoint, EngineError> {
    points
        .iter()
        .filter_map(|p| p.return_to_volatility().map(|ratio| (ratio, p)))
        .fold(None::<(f64, &FrontierPoint)>, |best, (ratio, p)| match best {
            Some((best_ratio, b)) if best_ratio >= ratio => Some((best_ratio, b)),
            _ => Some((ratio, p)),
        })
        .map(|(_, p)| p.clone())
        .ok_or_else(|| {
            EngineError::DegenerateInput(
                "every frontier point has zero volatility; tangency is undefined".to_string(),
            )
        })
}
