mod price_point;
pub mod optimization;
pub mod validation;

pub use price_point::{AssetSeries, Coverage, PricePoint};
pub use optimization::{
    AssetStats, Frontier, FrontierCurvePoint, FrontierPoint, PortfolioRequest, PortfolioResponse,
    PortfolioSummary, ReturnConstraint, ReturnStatistics, RiskLevel, RiskLevelInput, WeightBounds,
    VOLATILITY_EPSILON,
};
pub use validation::{CoverageGap, CoverageReport, CoverageRequest, StockValidity};
