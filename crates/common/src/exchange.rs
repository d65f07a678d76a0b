use async_trait::async_trait;

use crate::{CandleSeries, Result, Timeframe};

/// Abstraction over the market-data provider.
///
/// `BinanceClient` in `crates/engine` implements this against the public
/// kline endpoint. The indicator core never sees this trait; it only receives
/// the `CandleSeries` a source produced.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch the most recent `limit` candles for a pair, oldest first.
    async fn fetch_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries>;

    /// Fetch up to `total` candles of history, paging as needed.
    async fn fetch_history(
        &self,
        pair: &str,
        timeframe: Timeframe,
        total: usize,
    ) -> Result<CandleSeries>;
}
