use std::sync::OnceLock;

use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use tracing::info;

use crate::config::COVERAGE_TOLERANCE_DAYS;
use crate::errors::AppError;
use crate::external::price_provider::{into_series, PriceProvider, PriceProviderError};
use crate::models::{Coverage, CoverageGap, CoverageReport, StockValidity};
use crate::services::portfolio_service::normalize_tickers;

const PROBE_WINDOW_DAYS: i64 = 30;

fn ticker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9.\-^=]{1,10}$").expect("static ticker regex"))
}

/// Whether `ticker` looks like a symbol and has recent prices.
pub async fn check_stock_validity(
    provider: &dyn PriceProvider,
    ticker: &str,
) -> Result<StockValidity, AppError> {
    let symbol = ticker.trim().to_uppercase();

    if !ticker_pattern().is_match(&symbol) {
        return Ok(StockValidity {
            ticker: symbol,
            valid: false,
            reason: "Ticker must be 1-10 characters of letters, digits, '.', '-', '^' or '='".to_string(),
        });
    }

    let end = Utc::now().date_naive();
    let start = end - Duration::days(PROBE_WINDOW_DAYS);

    let validity = match provider.fetch_history(&symbol, start, end).await {
        Ok(points) => StockValidity {
            reason: format!("{} price observations in the last {} days", points.len(), PROBE_WINDOW_DAYS),
            ticker: symbol,
            valid: true,
        },
        Err(PriceProviderError::NotFound(_)) => StockValidity {
            reason: format!("No recent price data found for {}", symbol),
            ticker: symbol,
            valid: false,
        },
        Err(e) => return Err(AppError::from(e)),
    };

    info!("Validity probe for {}: {}", validity.ticker, validity.valid);
    Ok(validity)
}

/// Report tickers whose history does not reach within the tolerance of
/// both range bounds.
pub async fn check_date_coverage(
    provider: &dyn PriceProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CoverageReport, AppError> {
    if start >= end {
        return Err(AppError::Validation(format!(
            "start_date {} must be before end_date {}",
            start, end
        )));
    }
    let tickers = normalize_tickers(tickers)?;

    let mut missing = Vec::new();
    for ticker in &tickers {
        match provider.fetch_history(ticker, start, end).await {
            Ok(points) => {
                let series = into_series(ticker, points)?;
                if let Coverage::Partial { first, last } = series.coverage(start, end, COVERAGE_TOLERANCE_DAYS) {
                    missing.push(CoverageGap {
                        ticker: ticker.clone(),
                        first_date: first,
                        last_date: last,
                        reason: describe_gap(first, last, start, end),
                    });
                }
            }
            Err(PriceProviderError::NotFound(_)) => missing.push(CoverageGap {
                ticker: ticker.clone(),
                first_date: None,
                last_date: None,
                reason: "No price data in the requested range".to_string(),
            }),
            Err(e) => return Err(AppError::from(e)),
        }
    }

    Ok(CoverageReport {
        start_date: start,
        end_date: end,
        tolerance_days: COVERAGE_TOLERANCE_DAYS,
        all_covered: missing.is_empty(),
        missing,
    })
}

fn describe_gap(
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    match (first, last) {
        (Some(first), Some(last)) if first > start + Duration::days(COVERAGE_TOLERANCE_DAYS) => {
            format!("Data starts on {} (requested {}), ends {}", first, start, last)
        }
        (Some(_), Some(last)) => format!("Data ends on {} (requested {})", last, end),
        _ => "No price data in the requested range".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::price_provider::{ExternalPricePoint, StaticPriceProvider};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn daily(from: NaiveDate, to: NaiveDate) -> Vec<ExternalPricePoint> {
        let mut out = Vec::new();
        let mut date = from;
        while date <= to {
            out.push(ExternalPricePoint { date, close: 10.0 });
            date += Duration::days(1);
        }
        out
    }

    #[tokio::test]
    async fn test_malformed_ticker_is_invalid_without_probe() {
        let provider = StaticPriceProvider::new();
        let validity = check_stock_validity(&provider, "not a ticker!").await.unwrap();
        assert!(!validity.valid);
    }

    #[tokio::test]
    async fn test_recent_data_is_valid() {
        let today = Utc::now().date_naive();
        let provider = StaticPriceProvider::new().with_series("MSFT", daily(today - Duration::days(10), today));

        let validity = check_stock_validity(&provider, "msft").await.unwrap();
        assert!(validity.valid);
        assert_eq!(validity.ticker, "MSFT");

        let validity = check_stock_validity(&provider, "GOOG").await.unwrap();
        assert!(!validity.valid);
    }

    #[tokio::test]
    async fn test_coverage_report() {
        let provider = StaticPriceProvider::new()
            .with_series("FULL", daily(d("2023-01-03"), d("2023-12-29")))
            .with_series("LATE", daily(d("2023-03-01"), d("2023-12-29")))
            .with_series("EARLY", daily(d("2023-01-03"), d("2023-10-01")));

        let tickers = ["FULL", "LATE", "EARLY", "NONE"].map(String::from).to_vec();
        let report = check_date_coverage(&provider, &tickers, d("2023-01-01"), d("2023-12-31"))
            .await
            .unwrap();

        assert!(!report.all_covered);
        let names: Vec<&str> = report.missing.iter().map(|g| g.ticker.as_str()).collect();
        assert_eq!(names, vec!["LATE", "EARLY", "NONE"]);
        assert_eq!(report.missing[0].first_date, Some(d("2023-03-01")));
        assert!(report.missing[1].reason.contains("ends on"));
        assert_eq!(report.missing[2].first_date, None);
    }
}
