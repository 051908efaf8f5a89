use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

// A single adjusted close observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close_price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close_price: f64) -> Self {
        Self { date, close_price }
    }
}

/// Price history of one ticker, ordered by strictly increasing date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    pub ticker: String,
    points: Vec<PricePoint>,
}

/// How well a series covers a requested date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Coverage {
    Full,
    Partial {
        first: Option<NaiveDate>,
        last: Option<NaiveDate>,
    },
}

impl AssetSeries {
    /// Build a series, rejecting unordered dates and non-positive prices.
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, EngineError> {
        let ticker = ticker.into();

        if let Some(w) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(EngineError::InvalidSeries {
                ticker,
                reason: format!("dates not strictly increasing at {}", w[1].date),
            });
        }

        if let Some(p) = points
            .iter()
            .find(|p| !p.close_price.is_finite() || p.close_price <= 0.0)
        {
            return Err(EngineError::InvalidSeries {
                ticker,
                reason: format!("non-positive or non-finite price on {}", p.date),
            });
        }

        Ok(Self { ticker, points })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Coverage is full when the first and last observations fall within
    /// `tolerance_days` calendar days of the requested bounds.
    pub fn coverage(&self, start: NaiveDate, end: NaiveDate, tolerance_days: i64) -> Coverage {
        let tolerance = Duration::days(tolerance_days);
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) if first <= start + tolerance && last >= end - tolerance => {
                Coverage::Full
            }
            (first, last) => Coverage::Partial { first, last },
        }
    }
}
