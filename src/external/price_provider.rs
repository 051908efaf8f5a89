use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::errors::EngineError;
use crate::models::{AssetSeries, PricePoint};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalPricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceProviderError {
    /// The ticker has no price history at all in the requested range.
    #[error("no price history for {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Source of daily adjusted-close history.
///
/// Implementations return observations within `[start, end]` sorted by date,
/// or `NotFound` when the ticker has no data at all. A range that is only
/// partially covered is not an error; see [`AssetSeries::coverage`].
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError>;
}

/// Turn provider points into a validated series.
pub fn into_series(ticker: &str, points: Vec<ExternalPricePoint>) -> Result<AssetSeries, EngineError> {
    AssetSeries::new(
        ticker,
        points
            .into_iter()
            .map(|p| PricePoint::new(p.date, p.close))
            .collect(),
    )
}

/// In-memory provider backed by fixed series.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceProvider {
    series: HashMap<String, Vec<ExternalPricePoint>>,
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, ticker: &str, points: Vec<ExternalPricePoint>) -> Self {
        self.series.insert(ticker.to_uppercase(), points);
        self
    }

    /// Consecutive daily closes starting at `start`.
    pub fn with_daily_closes(self, ticker: &str, start: NaiveDate, closes: &[f64]) -> Self {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| ExternalPricePoint {
                date: start + chrono::Duration::days(i as i64),
                close,
            })
            .collect();
        self.with_series(ticker, points)
    }

    /// `len` consecutive daily closes from a seeded random walk starting at 100.
    ///
    /// Each step moves by `drift` plus uniform noise of total width `swing`.
    pub fn with_random_walk(
        self,
        ticker: &str,
        start: NaiveDate,
        seed: u64,
        drift: f64,
        swing: f64,
        len: usize,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = 100.0;
        let closes: Vec<f64> = (0..len)
            .map(|_| {
                price *= 1.0 + drift + (rng.random::<f64>() - 0.5) * swing;
                price
            })
            .collect();
        self.with_daily_closes(ticker, start, &closes)
    }
}

#[async_trait]
impl PriceProvider for StaticPriceProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let points: Vec<ExternalPricePoint> = self
            .series
            .get(&ticker.to_uppercase())
            .map(|all| {
                all.iter()
                    .filter(|p| p.date >= start && p.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        if points.is_empty() {
            return Err(PriceProviderError::NotFound(ticker.to_string()));
        }
        Ok(points)
    }
}
