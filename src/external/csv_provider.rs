use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};

/// Reads `<TICKER>.csv` files (Yahoo download layout) from a directory.
pub struct CsvPriceProvider {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Adj Close", default)]
    adj_close: Option<String>,
    #[serde(rename = "Close", default)]
    close: Option<String>,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker.to_uppercase()))
    }
}

/// Parse one CSV file; rows with a missing or `null` close are skipped.
fn read_points(path: &Path) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PriceProviderError::BadResponse(format!("{}: {}", path.display(), e)))?;

    let mut points = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row.map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        let raw_close = row.adj_close.or(row.close).unwrap_or_default();
        let raw_close = raw_close.trim();
        if raw_close.is_empty() || raw_close.eq_ignore_ascii_case("null") {
            continue;
        }

        let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d")
            .map_err(|e| PriceProviderError::Parse(format!("bad date '{}': {}", row.date, e)))?;
        let close = raw_close
            .parse::<f64>()
            .map_err(|e| PriceProviderError::Parse(format!("bad close '{}': {}", raw_close, e)))?;

        points.push(ExternalPricePoint { date, close });
    }

    points.sort_by_key(|p| p.date);
    Ok(points)
}

#[async_trait]
impl PriceProvider for CsvPriceProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Err(PriceProviderError::NotFound(ticker.to_string()));
        }

        let points = tokio::task::spawn_blocking(move || read_points(&path))
            .await
            .map_err(|e| PriceProviderError::BadResponse(e.to_string()))??;

        let in_range: Vec<ExternalPricePoint> = points
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect();

        debug!("Loaded {} CSV rows for {}", in_range.len(), ticker);

        if in_range.is_empty() {
            return Err(PriceProviderError::NotFound(ticker.to_string()));
        }
        Ok(in_range)
    }
}
