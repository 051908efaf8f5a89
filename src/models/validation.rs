use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Result of the cheap ticker probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockValidity {
    pub ticker: String,
    pub valid: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageRequest {
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A ticker whose history does not span the requested range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub ticker: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tolerance_days: i64,
    pub all_covered: bool,
    pub missing: Vec<CoverageGap>,
}
