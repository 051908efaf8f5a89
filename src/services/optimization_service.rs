//! Constrained mean-variance optimizer
//!
//! Weights always stay on the budget set {sum(w) = 1, lower <= w_i <= upper}
//! through an exact Euclidean projection. The target-return equality is
//! enforced with an augmented Lagrangian whose inner problems are solved by
//! accelerated projected gradient. The Sharpe objective is handled by
//! projected gradient ascent with backtracking.
use ndarray::{Array1, Array2};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::models::{ReturnConstraint, WeightBounds};

const PROJECTION_ITERATIONS: usize = 200;
const STEP_TOLERANCE: f64 = 1e-14;
const VARIANCE_FLOOR: f64 = 1e-20;
const MAX_PENALTY_GROWTH: f64 = 1e8;

/// Expected return of a weight vector.
pub fn portfolio_return(weights: &[f64], expected_returns: &Array1<f64>) -> f64 {
    weights
        .iter()
        .zip(expected_returns.iter())
        .map(|(w, r)| w * r)
        .sum()
}

/// Volatility `sqrt(w' Σ w)`, with tiny negative variances from rounding clamped to zero.
pub fn portfolio_volatility(weights: &[f64], covariance: &Array2<f64>) -> f64 {
    let w = Array1::from(weights.to_vec());
    w.dot(&covariance.dot(&w)).max(0.0).sqrt()
}

/// Solve for portfolio weights.
///
/// * `ReturnConstraint::TargetReturn(t)` minimizes volatility subject to
///   `w · μ = t`. Targets outside the range achievable under `bounds` are
///   clamped to the nearest achievable return, so callers must read the
///   achieved return from the weights rather than assume `t`.
/// * `ReturnConstraint::Unconstrained` maximizes `w · μ / sqrt(w' Σ w)`.
///
/// The search always starts from equal weights, so identical inputs give
/// identical outputs.
pub fn optimize(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    constraint: ReturnConstraint,
    bounds: WeightBounds,
    config: &EngineConfig,
) -> Result<Vec<f64>, EngineError> {
    let n = expected_returns.len();
    validate_inputs(expected_returns, covariance, bounds)?;

    if n == 1 {
        return Ok(vec![1.0]);
    }

    let start = project_onto_budget(&Array1::from_elem(n, 1.0 / n as f64), bounds);

    let weights = match constraint {
        ReturnConstraint::TargetReturn(target) => {
            minimize_volatility(expected_returns, covariance, target, bounds, start, config)?
        }
        ReturnConstraint::Unconstrained => {
            maximize_return_to_volatility(expected_returns, covariance, bounds, start, config)?
        }
    };

    check_feasible(&weights, bounds, config)?;
    Ok(weights.to_vec())
}

/// Lowest and highest portfolio return reachable under `bounds`.
pub fn achievable_return_range(expected_returns: &Array1<f64>, bounds: WeightBounds) -> (f64, f64) {
    let mut order: Vec<usize> = (0..expected_returns.len()).collect();
    order.sort_by(|&a, &b| expected_returns[a].total_cmp(&expected_returns[b]));

    let lowest = greedy_return(expected_returns, bounds, order.iter().copied());
    let highest = greedy_return(expected_returns, bounds, order.iter().rev().copied());
    (lowest, highest)
}

/// Fill assets to their upper bound in the given priority order.
fn greedy_return(
    expected_returns: &Array1<f64>,
    bounds: WeightBounds,
    priority: impl Iterator<Item = usize>,
) -> f64 {
    let n = expected_returns.len();
    let mut weights = vec![bounds.lower; n];
    let mut budget = 1.0 - n as f64 * bounds.lower;

    for i in priority {
        if budget <= 0.0 {
            break;
        }
        let add = (bounds.upper - bounds.lower).min(budget);
        weights[i] += add;
        budget -= add;
    }

    portfolio_return(&weights, expected_returns)
}

fn validate_inputs(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    bounds: WeightBounds,
) -> Result<(), EngineError> {
    let n = expected_returns.len();
    if n == 0 {
        return Err(EngineError::InvalidParameter("no assets to optimize".to_string()));
    }
    if covariance.dim() != (n, n) {
        return Err(EngineError::InvalidParameter(format!(
            "covariance is {:?} but there are {} expected returns",
            covariance.dim(),
            n
        )));
    }
    if expected_returns.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidParameter(
            "expected returns and covariance must be finite".to_string(),
        ));
    }
    if !bounds.admits(n) {
        return Err(EngineError::InvalidParameter(format!(
            "weight bounds [{}, {}] cannot sum to one across {} assets",
            bounds.lower, bounds.upper, n
        )));
    }
    Ok(())
}

/// Euclidean projection onto {sum(w) = 1, lower <= w_i <= upper}.
///
/// The projection is `clip(v - tau)` for the unique shift `tau` that
/// restores the budget, found by bisection.
fn project_onto_budget(v: &Array1<f64>, bounds: WeightBounds) -> Array1<f64> {
    let WeightBounds { lower, upper } = bounds;
    let clipped_sum = |tau: f64| v.iter().map(|x| (x - tau).clamp(lower, upper)).sum::<f64>();

    let mut lo = v.fold(f64::INFINITY, |a, &b| a.min(b)) - upper;
    let mut hi = v.fold(f64::NEG_INFINITY, |a, &b| a.max(b)) - lower;

    for _ in 0..PROJECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if clipped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * (1.0 + hi.abs()) {
            break;
        }
    }

    let tau = 0.5 * (lo + hi);
    let mut w = v.mapv(|x| (x - tau).clamp(lower, upper));

    // Spread the leftover rounding error over the coordinates strictly inside the box
    let residual = 1.0 - w.sum();
    let free: Vec<usize> = (0..w.len())
        .filter(|&i| w[i] > lower && w[i] < upper)
        .collect();
    if residual != 0.0 && !free.is_empty() {
        let share = residual / free.len() as f64;
        for i in free {
            w[i] = (w[i] + share).clamp(lower, upper);
        }
    }
    w
}

/// Gershgorin bound on the largest eigenvalue of the covariance.
fn spectral_bound(covariance: &Array2<f64>) -> f64 {
    covariance
        .outer_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn minimize_volatility(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    target: f64,
    bounds: WeightBounds,
    start: Array1<f64>,
    config: &EngineConfig,
) -> Result<Array1<f64>, EngineError> {
    let n = expected_returns.len();
    let (lowest, highest) = achievable_return_range(expected_returns, bounds);

    let target = if target > highest {
        if target - highest > config.tolerance {
            warn!(
                "Target return {:.6} above achievable maximum {:.6}; using the maximum",
                target, highest
            );
        }
        highest
    } else if target < lowest {
        if lowest - target > config.tolerance {
            warn!(
                "Target return {:.6} below achievable minimum {:.6}; using the minimum",
                target, lowest
            );
        }
        lowest
    } else {
        target
    };

    // On the budget set, w·μ - t == w·(μ - mean) - (t - mean); centring keeps
    // the penalty curvature proportional to the spread of returns.
    let mean_return = expected_returns.sum() / n as f64;
    let centered = expected_returns.mapv(|r| r - mean_return);
    let offset = target - mean_return;
    let spread = centered.dot(&centered);

    let average_variance = (0..n).map(|i| covariance[[i, i]]).sum::<f64>() / n as f64;
    let curvature = 2.0 * spectral_bound(covariance);

    if spread <= f64::EPSILON * (1.0 + mean_return * mean_return) {
        // Every asset has the same expected return: the budget already fixes it
        let problem = PenalizedVariance {
            covariance,
            centered: &centered,
            offset,
            multiplier: 0.0,
            penalty: 0.0,
        };
        let (weights, _) = problem.solve(start, bounds, curvature, config.max_inner_iterations);
        return Ok(weights);
    }

    let initial_penalty = 10.0 * average_variance.max(VARIANCE_FLOOR) / spread;
    let mut penalty = initial_penalty;
    let mut multiplier = 0.0;
    let mut weights = start;
    let mut previous_residual = f64::INFINITY;
    let mut residual = f64::INFINITY;

    for iteration in 1..=config.max_iterations {
        let problem = PenalizedVariance {
            covariance,
            centered: &centered,
            offset,
            multiplier,
            penalty,
        };
        let lipschitz = curvature + penalty * spread;
        let (next, converged) = problem.solve(weights, bounds, lipschitz, config.max_inner_iterations);
        if !converged {
            debug!("Inner solve hit its budget at outer iteration {}", iteration);
        }
        weights = next;

        residual = centered.dot(&weights) - offset;
        if !residual.is_finite() {
            break;
        }
        if residual.abs() <= config.tolerance {
            debug!(
                "Target {:.6} reached after {} outer iterations (residual {:e})",
                target, iteration, residual
            );
            return Ok(weights);
        }

        multiplier += penalty * residual;
        if residual.abs() > 0.25 * previous_residual {
            penalty = (penalty * 10.0).min(initial_penalty * MAX_PENALTY_GROWTH);
        }
        previous_residual = residual.abs();
    }

    Err(EngineError::OptimizationDiverged {
        iterations: config.max_iterations,
        residual: residual.abs(),
    })
}

/// `w'Σw + λ r(w) + ρ/2 r(w)^2` with `r(w) = c·w - offset`.
struct PenalizedVariance<'a> {
    covariance: &'a Array2<f64>,
    centered: &'a Array1<f64>,
    offset: f64,
    multiplier: f64,
    penalty: f64,
}

impl PenalizedVariance<'_> {
    fn gradient(&self, w: &Array1<f64>) -> Array1<f64> {
        let residual = self.centered.dot(w) - self.offset;
        let scale = self.multiplier + self.penalty * residual;
        self.covariance.dot(w) * 2.0 + self.centered * scale
    }

    /// Accelerated projected gradient with adaptive restart. Returns the
    /// final iterate and whether the step size fell below tolerance.
    fn solve(
        &self,
        start: Array1<f64>,
        bounds: WeightBounds,
        lipschitz: f64,
        max_iterations: usize,
    ) -> (Array1<f64>, bool) {
        if lipschitz <= 0.0 {
            return (start, true);
        }
        let step = 1.0 / lipschitz;

        let mut x = start;
        let mut y = x.clone();
        let mut momentum = 1.0_f64;

        for _ in 0..max_iterations {
            let gradient = self.gradient(&y);
            let next = project_onto_budget(&(&y - &(gradient * step)), bounds);

            let movement = &next - &x;
            if movement.iter().all(|d| d.abs() < STEP_TOLERANCE) {
                return (next, true);
            }

            let next_momentum = 0.5 * (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt());
            if (&y - &next).dot(&movement) > 0.0 {
                // Momentum is working against descent, restart it
                momentum = 1.0;
                y = next.clone();
            } else {
                y = &next + &(movement * ((momentum - 1.0) / next_momentum));
                momentum = next_momentum;
            }
            x = next;
        }

        (x, false)
    }
}

fn maximize_return_to_volatility(
    expected_returns: &Array1<f64>,
    covariance: &Array2<f64>,
    bounds: WeightBounds,
    start: Array1<f64>,
    config: &EngineConfig,
) -> Result<Array1<f64>, EngineError> {
    let objective = |w: &Array1<f64>| -> Option<f64> {
        let variance = w.dot(&covariance.dot(w));
        if variance > VARIANCE_FLOOR {
            Some(-expected_returns.dot(w) / variance.sqrt())
        } else {
            None
        }
    };
    let gradient = |w: &Array1<f64>| -> Array1<f64> {
        let sigma_w = covariance.dot(w);
        let variance = w.dot(&sigma_w);
        let volatility = variance.sqrt();
        let ret = expected_returns.dot(w);
        (sigma_w * (ret / (variance * volatility))) - &(expected_returns / volatility)
    };

    let mut weights = start;
    let mut value = objective(&weights).ok_or_else(|| {
        EngineError::DegenerateInput(
            "equal-weight portfolio has zero variance; return/volatility is undefined".to_string(),
        )
    })?;

    let mut step = 1.0 / spectral_bound(covariance).max(VARIANCE_FLOOR).sqrt();
    let max_iterations = config.max_inner_iterations;

    for iteration in 0..max_iterations {
        let g = gradient(&weights);

        let mut accepted = None;
        for _ in 0..60 {
            let candidate = project_onto_budget(&(&weights - &(&g * step)), bounds);
            let movement = &candidate - &weights;
            if let Some(candidate_value) = objective(&candidate) {
                let model = value + g.dot(&movement) + movement.dot(&movement) / (2.0 * step);
                if candidate_value <= model + 1e-15 * value.abs() {
                    accepted = Some((candidate, candidate_value, movement));
                    break;
                }
            }
            step *= 0.5;
        }

        let Some((candidate, candidate_value, movement)) = accepted else {
            debug!("Line search exhausted after {} iterations", iteration);
            return Ok(weights);
        };

        if !candidate_value.is_finite() {
            return Err(EngineError::OptimizationDiverged {
                iterations: iteration,
                residual: f64::NAN,
            });
        }

        weights = candidate;
        value = candidate_value;
        if movement.iter().all(|d| d.abs() < STEP_TOLERANCE) {
            debug!("Return/volatility maximized after {} iterations", iteration + 1);
            return Ok(weights);
        }
        step *= 2.0;
    }

    warn!(
        "Return/volatility search used its {} iteration budget; returning last feasible iterate",
        max_iterations
    );
    Ok(weights)
}

fn check_feasible(
    weights: &Array1<f64>,
    bounds: WeightBounds,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let budget_residual = (weights.sum() - 1.0).abs();
    let bound_violation = weights
        .iter()
        .map(|w| (bounds.lower - w).max(w - bounds.upper).max(0.0))
        .fold(0.0, f64::max);
    let residual = budget_residual.max(bound_violation);

    if weights.iter().any(|w| !w.is_finite()) || residual > config.tolerance {
        return Err(EngineError::OptimizationDiverged {
            iterations: config.max_iterations,
            residual,
        });
    }
    Ok(())
}
