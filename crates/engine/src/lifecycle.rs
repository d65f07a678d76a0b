use std::sync::Arc;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{CandleSeries, CandleSource};
use strategy::{scan, MarketConfig, ScanReport, SignalDetector};

use crate::schedule::Schedule;

/// Concurrent kline requests per scan.
const FETCH_CONCURRENCY: usize = 8;

/// Drives scheduled scans: fetch every pair, run the detector, hand the
/// report on.
pub struct Engine {
    source: Arc<dyn CandleSource>,
    detector: SignalDetector,
    pairs: Vec<String>,
    market: MarketConfig,
    schedule: Schedule,
}

impl Engine {
    pub fn new(
        source: Arc<dyn CandleSource>,
        detector: SignalDetector,
        pairs: Vec<String>,
        market: MarketConfig,
        schedule: Schedule,
    ) -> Self {
        Self {
            source,
            detector,
            pairs,
            market,
            schedule,
        }
    }

    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Fetch all pairs and scan them once.
    ///
    /// Pairs whose fetch fails are logged and listed in `failed`; they never
    /// abort the scan.
    pub async fn run_once(&self) -> ScanReport {
        let timeframe = self.market.timeframe;
        let limit = self.market.candle_limit;

        let mut results: Vec<(usize, String, common::Result<CandleSeries>)> =
            stream::iter(self.pairs.iter().cloned().enumerate())
                .map(|(i, pair)| {
                    let source = Arc::clone(&self.source);
                    async move {
                        let res = source.fetch_candles(&pair, timeframe, limit).await;
                        (i, pair, res)
                    }
                })
                .buffer_unordered(FETCH_CONCURRENCY)
                .collect()
                .await;

        // restore input order so report lists follow the pairs file
        results.sort_by_key(|(i, _, _)| *i);

        let mut fetched = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (_, pair, res) in results {
            match res {
                Ok(series) => fetched.push(series),
                Err(e) => {
                    warn!(pair = %pair, error = %e, "Failed to fetch candles");
                    failures.push((pair, e.to_string()));
                }
            }
        }

        let mut report = scan(&self.detector, &fetched);
        for (pair, reason) in failures {
            report.record_failure(&pair, reason);
        }
        report
    }

    /// Sleep until each scheduled slot, scan, and send the report on `tx`.
    /// Returns once the receiving side has gone away.
    pub async fn run(self, tx: mpsc::Sender<ScanReport>) {
        info!(
            pairs = self.pairs.len(),
            timeframe = %self.market.timeframe,
            slots = self.schedule.times().len(),
            "Engine started"
        );

        loop {
            let now = Utc::now();
            let next = self.schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next, "Waiting for next scheduled scan");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = tx.closed() => {
                    warn!("Report channel closed, engine stopping");
                    return;
                }
            }

            let report = self.run_once().await;
            if tx.send(report).await.is_err() {
                warn!("Report channel closed, engine stopping");
                return;
            }
        }
    }
}
