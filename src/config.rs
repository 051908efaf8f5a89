use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::WeightBounds;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Calendar-day slack allowed when checking range coverage.
pub const COVERAGE_TOLERANCE_DAYS: i64 = 7;

/// Tunables for the optimization engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub frontier_points: usize,
    pub allow_short: bool,
    /// Outer iteration budget per optimizer call
    pub max_iterations: usize,
    /// Inner (projected gradient) iteration budget per outer iteration
    pub max_inner_iterations: usize,
    /// Maximum tolerated constraint violation
    pub tolerance: f64,
    pub trading_days: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frontier_points: 12,
            allow_short: false,
            max_iterations: 200,
            max_inner_iterations: 20_000,
            tolerance: 1e-8,
            trading_days: TRADING_DAYS_PER_YEAR,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            frontier_points: env_or("FRONTIER_POINTS", defaults.frontier_points)?,
            allow_short: env_or("ALLOW_SHORT", defaults.allow_short)?,
            max_iterations: env_or("SOLVER_MAX_ITERATIONS", defaults.max_iterations)?,
            max_inner_iterations: env_or("SOLVER_MAX_INNER_ITERATIONS", defaults.max_inner_iterations)?,
            tolerance: env_or("SOLVER_TOLERANCE", defaults.tolerance)?,
            trading_days: defaults.trading_days,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.frontier_points == 0 {
            return Err("FRONTIER_POINTS must be at least 1".to_string());
        }
        if self.max_iterations == 0 || self.max_inner_iterations == 0 {
            return Err("Solver iteration budgets must be positive".to_string());
        }
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(format!("SOLVER_TOLERANCE out of range: {}", self.tolerance));
        }
        Ok(())
    }

    pub fn bounds(&self) -> WeightBounds {
        WeightBounds::for_short_selling(self.allow_short)
    }

    /// Same configuration with a per-request short-selling override applied.
    pub fn with_short_selling(&self, allow_short: Option<bool>) -> Self {
        Self {
            allow_short: allow_short.unwrap_or(self.allow_short),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Yahoo,
    Csv,
    Mock,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yahoo" => Ok(ProviderKind::Yahoo),
            "csv" => Ok(ProviderKind::Csv),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(format!(
                "Invalid PRICE_PROVIDER: {}. Must be 'yahoo', 'csv', or 'mock'",
                other
            )),
        }
    }
}

/// Process-level settings read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub price_provider: ProviderKind,
    pub price_data_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| format!("Invalid BIND_ADDR: {}", e))?;

        let price_provider = std::env::var("PRICE_PROVIDER")
            .unwrap_or_else(|_| "yahoo".to_string())
            .parse::<ProviderKind>()?;

        let price_data_dir = std::env::var("PRICE_DATA_DIR").ok().map(PathBuf::from);
        if price_provider == ProviderKind::Csv && price_data_dir.is_none() {
            return Err("PRICE_PROVIDER is csv but PRICE_DATA_DIR is not set".to_string());
        }

        Ok(Self {
            bind_addr,
            price_provider,
            price_data_dir,
            engine: EngineConfig::from_env()?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid {}: {} ({})", key, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frontier_points, 12);
        assert_eq!(config.bounds(), WeightBounds::LONG_ONLY);
    }

    #[test]
    fn test_short_selling_override() {
        let config = EngineConfig::default().with_short_selling(Some(true));
        assert_eq!(config.bounds(), WeightBounds::WITH_SHORTS);

        let unchanged = config.with_short_selling(None);
        assert!(unchanged.allow_short);
    }

    #[test]
    fn test_rejects_zero_frontier_points() {
        let config = EngineConfig { frontier_points: 0, ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("Yahoo".parse::<ProviderKind>().unwrap(), ProviderKind::Yahoo);
        assert_eq!("mock".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert!("bloomberg".parse::<ProviderKind>().is_err());
    }
}
