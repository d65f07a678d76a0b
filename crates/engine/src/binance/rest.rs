use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use common::{Candle, CandleSeries, CandleSource, Error, Result, Timeframe};

use crate::pairs::normalize_symbol;

/// Largest page the kline endpoint serves.
const MAX_PAGE: usize = 1000;
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Public market-data client for Binance spot klines. No keys, no signing.
pub struct BinanceClient {
    base_url: String,
    closed_only: bool,
    http: Client,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            closed_only: true,
            http,
        })
    }

    /// Whether a still-forming last candle is dropped from every response.
    pub fn closed_only(mut self, closed_only: bool) -> Self {
        self.closed_only = closed_only;
        self
    }

    /// GET `/api/v3/klines`, retrying timeouts, connection errors, 429 and 5xx.
    async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        end_time_ms: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let mut query = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.min(MAX_PAGE).to_string()),
        ];
        if let Some(end) = end_time_ms {
            query.push(("endTime", end.to_string()));
        }

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.get_once(&url, &query).await {
                Ok(body) => {
                    return parse_klines(&body, Utc::now().timestamp_millis(), self.closed_only)
                }
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(e)) if attempt >= MAX_ATTEMPTS => return Err(e),
                Err(Attempt::Transient(e)) => {
                    warn!(symbol, attempt, error = %e, backoff = ?backoff, "Kline request failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<String, Attempt> {
        let resp = self.http.get(url).query(query).send().await.map_err(|e| {
            let err = Error::Http(e.to_string());
            if e.is_timeout() || e.is_connect() || e.is_request() {
                Attempt::Transient(err)
            } else {
                Attempt::Fatal(err)
            }
        })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Attempt::Transient(Error::Http(e.to_string())))?;

        if status.is_success() {
            return Ok(body);
        }
        let err = Error::Exchange(format!("HTTP {status}: {body}"));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(Attempt::Transient(err))
        } else {
            Err(Attempt::Fatal(err))
        }
    }
}

enum Attempt {
    Transient(Error),
    Fatal(Error),
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries> {
        let symbol = normalize_symbol(pair);
        // one extra so dropping the forming candle still leaves `limit`
        let request = if self.closed_only { limit + 1 } else { limit };
        let mut candles = self.klines(&symbol, timeframe, request, None).await?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!(pair = %symbol, %timeframe, candles = candles.len(), "Fetched candles");
        CandleSeries::new(symbol, candles)
    }

    async fn fetch_history(
        &self,
        pair: &str,
        timeframe: Timeframe,
        total: usize,
    ) -> Result<CandleSeries> {
        let symbol = normalize_symbol(pair);
        let mut pages: Vec<Vec<Candle>> = Vec::new();
        let mut collected = 0;
        let mut end_time_ms = None;

        while collected < total {
            let requested = (total - collected).min(MAX_PAGE);
            let page = self
                .klines(&symbol, timeframe, requested, end_time_ms)
                .await?;
            let Some(first) = page.first() else {
                break;
            };
            end_time_ms = Some(first.timestamp.timestamp_millis() - 1);
            collected += page.len();
            // the newest page may lose its forming candle
            let short_page = page.len() + 1 < requested;
            pages.push(page);
            if short_page && collected < total {
                debug!(pair = %symbol, collected, "History exhausted before requested depth");
                break;
            }
        }

        let mut candles: Vec<Candle> = pages.into_iter().rev().flatten().collect();
        candles.dedup_by_key(|c| c.timestamp);
        if candles.len() > total {
            candles.drain(..candles.len() - total);
        }
        debug!(pair = %symbol, %timeframe, candles = candles.len(), "Fetched history");
        CandleSeries::new(symbol, candles)
    }
}

/// Parse a `/api/v3/klines` response body.
///
/// Each row is `[open_time, "open", "high", "low", "close", "volume",
/// close_time, ...]`; candles are stamped with their open time. With
/// `closed_only`, rows whose close time is after `now_ms` are dropped.
pub fn parse_klines(body: &str, now_ms: i64, closed_only: bool) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    let mut candles = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        if row.len() < 7 {
            return Err(Error::Exchange(format!(
                "kline row {i} has {} fields, expected at least 7",
                row.len()
            )));
        }
        let close_time_ms = int_field(row, 6, i)?;
        if closed_only && close_time_ms > now_ms {
            debug!(row = i, "Dropping unclosed candle");
            continue;
        }
        candles.push(Candle {
            timestamp: millis_to_utc(int_field(row, 0, i)?, i)?,
            open: price_field(row, 1, i)?,
            high: price_field(row, 2, i)?,
            low: price_field(row, 3, i)?,
            close: price_field(row, 4, i)?,
            volume: price_field(row, 5, i)?,
        });
    }
    Ok(candles)
}

fn int_field(row: &[Value], col: usize, i: usize) -> Result<i64> {
    row[col]
        .as_i64()
        .ok_or_else(|| Error::Exchange(format!("kline row {i} column {col} is not an integer")))
}

/// Binance sends prices as strings; plain numbers are accepted too.
fn price_field(row: &[Value], col: usize, i: usize) -> Result<f64> {
    let parsed = match &row[col] {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::Exchange(format!("kline row {i} column {col} is not a price")))
}

fn millis_to_utc(ms: i64, i: usize) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::Exchange(format!("kline row {i} has invalid timestamp {ms}")))
}
