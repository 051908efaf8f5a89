//! Return statistics estimator
//!
//! Turns aligned daily price histories into annualized expected returns, an
//! annualized covariance matrix and an (unscaled) correlation matrix.
use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::errors::EngineError;
use crate::models::{AssetSeries, ReturnStatistics};

/// Estimate return statistics for at least two assets.
///
/// Series are aligned on the dates common to every asset. Simple
/// period-over-period percentage changes are computed on the aligned prices
/// and the first (undefined) change is dropped.
///
/// # Errors
/// * `MissingAsset` when a series is empty
/// * `InsufficientData` when fewer than two aligned returns remain
/// * `DegenerateInput` when fewer than two assets are supplied
pub fn estimate(series: &[AssetSeries], trading_days: f64) -> Result<ReturnStatistics, EngineError> {
    if series.len() < 2 {
        return Err(EngineError::DegenerateInput(
            "at least two assets are required to estimate a covariance structure".to_string(),
        ));
    }

    if let Some(empty) = series.iter().find(|s| s.is_empty()) {
        return Err(EngineError::MissingAsset(empty.ticker.clone()));
    }

    let dates = common_dates(series);
    let observations = dates.len().saturating_sub(1);
    if observations < 2 {
        // Blame the shortest history, it bounds the alignment
        let shortest = series
            .iter()
            .min_by_key(|s| s.len())
            .map(|s| s.ticker.clone())
            .unwrap_or_default();
        return Err(EngineError::InsufficientData {
            ticker: shortest,
            observations,
        });
    }

    let returns = aligned_returns(series, &dates);
    let tickers: Vec<String> = series.iter().map(|s| s.ticker.clone()).collect();

    let means = returns
        .mean_axis(Axis(0))
        .ok_or_else(|| EngineError::InvalidParameter("empty return matrix".to_string()))?;
    let daily_covariance = sample_covariance(&returns, &means);
    let correlation = correlation_from_covariance(&daily_covariance);

    debug!(
        "Estimated statistics for {} assets over {} aligned observations",
        tickers.len(),
        observations
    );

    Ok(ReturnStatistics {
        tickers,
        expected_returns: means * trading_days,
        covariance: daily_covariance * trading_days,
        correlation,
        observations,
    })
}

/// Dates present in every series, ascending.
fn common_dates(series: &[AssetSeries]) -> Vec<NaiveDate> {
    let mut common: BTreeSet<NaiveDate> = series[0].points().iter().map(|p| p.date).collect();
    for s in &series[1..] {
        let dates: BTreeSet<NaiveDate> = s.points().iter().map(|p| p.date).collect();
        common.retain(|d| dates.contains(d));
    }
    common.into_iter().collect()
}

/// Observation-by-asset matrix of simple returns on the aligned dates.
fn aligned_returns(series: &[AssetSeries], dates: &[NaiveDate]) -> Array2<f64> {
    let mut returns = Array2::<f64>::zeros((dates.len() - 1, series.len()));

    for (j, s) in series.iter().enumerate() {
        let by_date: HashMap<NaiveDate, f64> =
            s.points().iter().map(|p| (p.date, p.close_price)).collect();
        let prices: Vec<f64> = dates.iter().map(|d| by_date[d]).collect();

        for (i, w) in prices.windows(2).enumerate() {
            returns[[i, j]] = (w[1] - w[0]) / w[0];
        }
    }

    returns
}

fn sample_covariance(returns: &Array2<f64>, means: &Array1<f64>) -> Array2<f64> {
    let centered = returns - means;
    let denom = (returns.nrows() - 1) as f64;
    centered.t().dot(&centered) / denom
}

/// Pearson correlation; pairs involving a constant series are reported as 0.
fn correlation_from_covariance(covariance: &Array2<f64>) -> Array2<f64> {
    let n = covariance.nrows();
    let std_devs: Vec<f64> = (0..n).map(|i| covariance[[i, i]].max(0.0).sqrt()).collect();

    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            1.0
        } else if std_devs[i] > 0.0 && std_devs[j] > 0.0 {
            (covariance[[i, j]] / (std_devs[i] * std_devs[j])).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use chrono::Duration;

    fn series(ticker: &str, prices: &[f64]) -> AssetSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| PricePoint::new(start + Duration::days(i as i64), p))
            .collect();
        AssetSeries::new(ticker, points).unwrap()
    }

    #[test]
    fn test_known_values() {
        // Returns: A = [0.1, -0.1, 0.1], B = [0.0, 0.05, -0.05]
        let a = series("A", &[100.0, 110.0, 99.0, 108.9]);
        let b = series("B", &[100.0, 100.0, 105.0, 99.75]);

        let stats = estimate(&[a, b], 252.0).unwrap();

        assert_eq!(stats.observations, 3);
        let mean_a = 0.1 / 3.0;
        assert!((stats.expected_returns[0] - mean_a * 252.0).abs() < 1e-9);
        assert!(stats.expected_returns[1].abs() < 1e-9);

        // var(A) = sum((r - mean)^2) / 2
        let var_a = [0.1, -0.1, 0.1]
            .iter()
            .map(|r| (r - mean_a) * (r - mean_a))
            .sum::<f64>()
            / 2.0;
        assert!((stats.covariance[[0, 0]] - var_a * 252.0).abs() < 1e-9);
        assert!((stats.covariance[[0, 1]] - stats.covariance[[1, 0]]).abs() < 1e-15);
        assert_eq!(stats.correlation[[0, 0]], 1.0);
        assert!(stats.correlation[[0, 1]].abs() <= 1.0);
    }

    #[test]
    fn test_perfectly_correlated_assets() {
        let a = series("A", &[10.0, 11.0, 12.1, 11.0, 12.0]);
        let b = series("B", &[20.0, 22.0, 24.2, 22.0, 24.0]);

        let stats = estimate(&[a, b], 252.0).unwrap();
        assert!((stats.correlation[[0, 1]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_aligns_on_common_dates() {
        let a = series("A", &[10.0, 11.0, 12.0, 13.0, 14.0]);
        let b = series("B", &[5.0, 5.5, 6.0]);

        let stats = estimate(&[a, b], 252.0).unwrap();
        assert_eq!(stats.observations, 2);
    }

    #[test]
    fn test_insufficient_observations() {
        let a = series("A", &[10.0, 11.0, 12.0]);
        let b = series("B", &[5.0, 6.0]);

        match estimate(&[a, b], 252.0) {
            Err(EngineError::InsufficientData { ticker, observations }) => {
                assert_eq!(ticker, "B");
                assert_eq!(observations, 1);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_series_is_missing_asset() {
        let a = series("A", &[10.0, 11.0, 12.0]);
        let b = AssetSeries::new("B", vec![]).unwrap();

        assert_eq!(
            estimate(&[a, b], 252.0).unwrap_err(),
            EngineError::MissingAsset("B".to_string())
        );
    }

    #[test]
    fn test_single_asset_is_degenerate() {
        let a = series("A", &[10.0, 11.0, 12.0]);
        assert_eq!(estimate(&[a], 252.0).unwrap_err().kind(), "degenerate_input");
    }

    #[test]
    fn test_constant_series_has_zero_correlation() {
        let a = series("A", &[10.0, 10.0, 10.0, 10.0]);
        let b = series("B", &[5.0, 6.0, 5.5, 6.5]);

        let stats = estimate(&[a, b], 252.0).unwrap();
        assert_eq!(stats.covariance[[0, 0]], 0.0);
        assert_eq!(stats.correlation[[0, 1]], 0.0);
    }
}
