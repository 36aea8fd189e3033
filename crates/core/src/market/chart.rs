use crate::config::Settings;
use crate::error::ProviderError;
use crate::market::ticker::normalize_for_chart;
use crate::market::{PriceBar, PriceSource};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_RETRIES: u32 = 3;
const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (compatible; hedgedesk/0.1)";

/// Daily bars from a Yahoo-style `/v8/finance/chart/{symbol}` endpoint.
#[derive(Debug, Clone)]
pub struct ChartPriceSource {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    timeout: Duration,
}

impl ChartPriceSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .price_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let retries = std::env::var("PRICE_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RETRIES);

        // The engine bounds the whole fetch with `settings.price_timeout`, so each
        // attempt gets its share of what is left after backoff sleeps.
        let http = reqwest::Client::builder()
            .timeout(attempt_timeout(settings.price_timeout, retries))
            .build()
            .context("failed to build price source http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
            timeout: settings.price_timeout,
        })
    }

    fn url(&self, symbol: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            symbol
        )
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    async fn fetch_once(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        let (period1, period2) = period_bounds(start, end)?;

        let res = self
            .http
            .get(self.url(symbol))
            .headers(Self::headers())
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await
            .context("price source request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read price source response")?;

        if !status.is_success() {
            anyhow::bail!("price source HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .with_context(|| format!("price source response is not a chart payload: {text}"))?;
        parsed.into_bars(start, end)
    }
}

#[async_trait::async_trait]
impl PriceSource for ChartPriceSource {
    fn source_name(&self) -> &'static str {
        "chart_http_json"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let symbol = normalize_for_chart(ticker);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(&symbol, start, end).await {
                Ok(bars) if bars.is_empty() => {
                    return Err(ProviderError::data_unavailable(
                        ticker,
                        format!("no daily bars for {symbol} between {start} and {end}"),
                    ));
                }
                Ok(bars) => return Ok(bars),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(ProviderError::data_unavailable(ticker, format!("{err:#}")));
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, %symbol, ?backoff, error = %err, "price fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Total sleep between `retries` attempts (1s, 2s, 4s, ...).
fn backoff_total(retries: u32) -> Duration {
    let sleeps = retries.saturating_sub(1).min(16);
    Duration::from_secs((1u64 << sleeps) - 1)
}

fn attempt_timeout(total: Duration, retries: u32) -> Duration {
    let budget = total.saturating_sub(backoff_total(retries));
    (budget / retries.max(1)).max(MIN_ATTEMPT_TIMEOUT)
}

fn period_bounds(start: NaiveDate, end: NaiveDate) -> Result<(i64, i64)> {
    let from = start
        .and_hms_opt(0, 0, 0)
        .context("invalid start date")?
        .and_utc()
        .timestamp();
    // Exclusive upper bound: midnight after `end`.
    let to = end
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid end date")?
        .and_utc()
        .timestamp();
    Ok((from, to))
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

impl ChartResponse {
    fn into_bars(self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>> {
        if let Some(err) = self.chart.error.filter(|e| !e.is_null()) {
            anyhow::bail!("chart error: {err}");
        }

        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().enumerate() {
            // Bars with a missing close (halts, partial sessions) are skipped.
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            let Some(date) = DateTime::from_timestamp(*ts, 0).map(|dt| dt.date_naive()) else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            bars.push(PriceBar {
                date,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close,
                volume: quote.volume.get(i).copied().flatten(),
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}
