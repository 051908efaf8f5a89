use std::fmt;

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Annualized return statistics for an aligned basket of assets.
///
/// Index `i` of every vector/matrix refers to `tickers[i]`.
#[derive(Debug, Clone)]
pub struct ReturnStatistics {
    pub tickers: Vec<String>,
    /// Annualized mean of daily percentage changes
    pub expected_returns: Array1<f64>,
    /// Annualized sample covariance of daily percentage changes
    pub covariance: Array2<f64>,
    /// Pearson correlation of daily percentage changes (unscaled)
    pub correlation: Array2<f64>,
    /// Number of aligned return observations used
    pub observations: usize,
}

impl ReturnStatistics {
    pub fn asset_volatility(&self, i: usize) -> f64 {
        self.covariance[[i, i]].max(0.0).sqrt()
    }

    pub fn per_asset_stats(&self) -> Vec<AssetStats> {
        self.tickers
            .iter()
            .enumerate()
            .map(|(i, ticker)| AssetStats {
                ticker: ticker.clone(),
                expected_return: self.expected_returns[i],
                volatility: self.asset_volatility(i),
            })
            .collect()
    }

    pub fn correlation_rows(&self) -> Vec<Vec<f64>> {
        self.correlation.outer_iter().map(|row| row.to_vec()).collect()
    }
}

/// Box bounds applied to every weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl WeightBounds {
    pub const LONG_ONLY: WeightBounds = WeightBounds { lower: 0.0, upper: 1.0 };
    pub const WITH_SHORTS: WeightBounds = WeightBounds { lower: -1.0, upper: 1.0 };

    pub fn for_short_selling(allow_short: bool) -> Self {
        if allow_short {
            Self::WITH_SHORTS
        } else {
            Self::LONG_ONLY
        }
    }

    /// Whether `n` weights within these bounds can sum to one.
    pub fn admits(&self, n: usize) -> bool {
        let n = n as f64;
        self.lower <= self.upper && n * self.lower <= 1.0 && n * self.upper >= 1.0
    }
}

/// Constraint set built once per optimizer call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReturnConstraint {
    /// Maximize return/volatility with only the budget constraint
    Unconstrained,
    /// Minimize volatility subject to `weights · returns == target`
    TargetReturn(f64),
}

/// A computed point on the efficient frontier. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub achieved_return: f64,
    pub volatility: f64,
    pub weights: Vec<f64>,
}

impl FrontierPoint {
    /// Return/volatility ratio at a zero risk-free rate, `None` when volatility is ~0.
    pub fn return_to_volatility(&self) -> Option<f64> {
        if self.volatility > VOLATILITY_EPSILON {
            Some(self.achieved_return / self.volatility)
        } else {
            None
        }
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            expected_return: self.achieved_return,
            volatility: self.volatility,
            weights: self.weights.clone(),
        }
    }
}

pub const VOLATILITY_EPSILON: f64 = 1e-12;

/// Efficient frontier ordered by increasing target return, plus the anchors
/// derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontier {
    pub points: Vec<FrontierPoint>,
    pub min_variance: FrontierPoint,
    pub tangency: FrontierPoint,
    /// Largest single-asset expected return (upper end of the sweep)
    pub max_return: f64,
}

/// Client risk preference, 1 (most conservative) to 10 (most aggressive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, EngineError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(EngineError::InvalidRiskLevel(value.to_string()))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        raw.trim()
            .parse::<i64>()
            .map_err(|_| EngineError::InvalidRiskLevel(raw.to_string()))
            .and_then(|v| Self::new(v).map_err(|_| EngineError::InvalidRiskLevel(raw.to_string())))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk level as it arrives over the wire: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RiskLevelInput {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RiskLevelInput {
    pub fn resolve(&self) -> Result<RiskLevel, EngineError> {
        match self {
            RiskLevelInput::Integer(v) => RiskLevel::new(*v),
            RiskLevelInput::Float(v) if v.fract() == 0.0 && v.is_finite() => RiskLevel::new(*v as i64)
                .map_err(|_| EngineError::InvalidRiskLevel(v.to_string())),
            RiskLevelInput::Float(v) => Err(EngineError::InvalidRiskLevel(v.to_string())),
            RiskLevelInput::Text(s) => RiskLevel::parse(s),
        }
    }
}

/// Request body for `POST /api/portfolio/optimize`.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioRequest {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub risk_level: Option<RiskLevelInput>,
    #[serde(default)]
    pub allow_short: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStats {
    pub ticker: String,
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierCurvePoint {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub volatility: f64,
    pub weights: Vec<f64>,
}

/// Response body for `POST /api/portfolio/optimize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub tickers: Vec<String>,
    /// Maximum return/volatility weights, or `[1.0]` for a single ticker
    pub weights: Vec<f64>,
    pub frontier: Vec<FrontierCurvePoint>,
    pub tangency: Option<PortfolioSummary>,
    pub min_variance: Option<PortfolioSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_portfolio: Option<PortfolioSummary>,
    pub per_asset_stats: Vec<AssetStats>,
    pub correlation: Vec<Vec<f64>>,
}
