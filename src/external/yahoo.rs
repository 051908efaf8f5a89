use crate::external::price_provider::{ExternalPricePoint, PriceProvider, PriceProviderError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::Deserialize;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; Optifolio/0.1)";

pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com")
    }

    fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            // The chart endpoint throttles requests that carry no user agent
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
        }
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Pair timestamps with closes, preferring adjusted closes when present.
fn parse_chart(
    ticker: &str,
    body: YahooChartResponse,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
    if let Some(err) = body.chart.error {
        return if err.code.eq_ignore_ascii_case("Not Found") {
            Err(PriceProviderError::NotFound(ticker.to_string()))
        } else {
            Err(PriceProviderError::BadResponse(
                err.description.unwrap_or(err.code),
            ))
        };
    }

    let Some(result) = body.chart.result.and_then(|mut r| r.pop()) else {
        return Err(PriceProviderError::NotFound(ticker.to_string()));
    };

    let closes = match result.indicators.adjclose.first() {
        Some(adj) => adj.adjclose.clone(),
        None => result
            .indicators
            .quote
            .first()
            .ok_or_else(|| PriceProviderError::BadResponse("missing quote".into()))?
            .close
            .clone(),
    };

    let mut out = Vec::new();

    for (i, ts) in result.timestamp.iter().enumerate() {
        // skip missing closes
        let Some(close) = closes.get(i).and_then(|v| *v) else { continue };

        let date = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| PriceProviderError::Parse("bad timestamp".into()))?
            .date_naive();

        if date < start || date > end {
            continue;
        }

        // keep the last bar when the feed repeats a date
        match out.last_mut() {
            Some(ExternalPricePoint { date: last, close: c }) if *last == date => *c = close,
            _ => out.push(ExternalPricePoint { date, close }),
        }
    }

    out.sort_by_key(|p| p.date);
    out.dedup_by_key(|p| p.date);

    if out.is_empty() {
        return Err(PriceProviderError::NotFound(ticker.to_string()));
    }
    Ok(out)
}

#[async_trait]
impl PriceProvider for YahooProvider {
    async fn fetch_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let period1 = unix_seconds(start).to_string();
        // period2 is exclusive, include the end date
        let period2 = (unix_seconds(end) + 86_400).to_string();

        let resp = self
            .client
            .get(url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "div,splits"),
            ])
            .send()
            .await
            .map_err(|e| PriceProviderError::Network(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::TOO_MANY_REQUESTS => return Err(PriceProviderError::RateLimited),
            reqwest::StatusCode::NOT_FOUND => return Err(PriceProviderError::NotFound(ticker.to_string())),
            _ => {}
        }

        let body = resp
            .json::<YahooChartResponse>()
            .await
            .map_err(|e| PriceProviderError::Parse(e.to_string()))?;

        parse_chart(ticker, body, start, end)
    }
}
