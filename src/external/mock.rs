use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};

/// Synthetic weekday random walks for demos without network access.
///
/// Each ticker gets its own seed, so a ticker always produces the same path.
pub struct MockPriceProvider;

impl MockPriceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockPriceProvider {
    fn default() -> Self {
        Self::new()
    }
}

// FNV-1a, stable across runs unlike the std hasher
fn ticker_seed(ticker: &str) -> u64 {
    ticker.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn random_walk(ticker: &str, start: NaiveDate, end: NaiveDate) -> Vec<ExternalPricePoint> {
    let mut rng = StdRng::seed_from_u64(ticker_seed(ticker));
    // Per-ticker drift and volatility so assets differ
    let drift = (rng.random::<f64>() - 0.3) * 0.002;
    let volatility = 0.005 + rng.random::<f64>() * 0.02;

    let mut current = 50.0 + rng.random::<f64>() * 150.0;
    let mut points = Vec::new();
    let mut date = start;

    while date <= end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            current *= 1.0 + drift + (rng.random::<f64>() - 0.5) * 2.0 * volatility;
            points.push(ExternalPricePoint { date, close: current });
        }
        date += Duration::days(1);
    }

    points
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let points = random_walk(&ticker.to_uppercase(), start, end);
        if points.is_empty() {
            return Err(PriceProviderError::NotFound(ticker.to_string()));
        }
        Ok(points)
    }
}
