use serde::Serialize;
use tracing::{info, warn};

use common::{CandleSeries, SignalKind};

use crate::detector::SignalDetector;

/// Result of one live scan across many pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub buy: Vec<String>,
    pub sell: Vec<String>,
    /// Pairs that could not be evaluated, with the reason.
    pub failed: Vec<(String, String)>,
}

impl ScanReport {
    pub fn has_signals(&self) -> bool {
        !self.buy.is_empty() || !self.sell.is_empty()
    }

    pub fn record(&mut self, pair: &str, kind: SignalKind) {
        let list = match kind {
            SignalKind::Buy => &mut self.buy,
            SignalKind::Sell => &mut self.sell,
        };
        if !list.iter().any(|p| p == pair) {
            list.push(pair.to_string());
        }
    }

    pub fn record_failure(&mut self, pair: &str, reason: impl Into<String>) {
        self.failed.push((pair.to_string(), reason.into()));
    }
}

/// Evaluate the most recent pairs of every series independently.
///
/// A pair that fails (too little data, bad candle) is logged and recorded
/// in `failed`; the remaining pairs are still scanned.
pub fn scan<'a, I>(detector: &SignalDetector, series: I) -> ScanReport
where
    I: IntoIterator<Item = &'a CandleSeries>,
{
    let mut report = ScanReport::default();

    for s in series {
        match detector.detect_latest(s) {
            Ok(signals) => {
                for signal in signals {
                    report.record(s.instrument(), signal.kind);
                }
            }
            Err(e) => {
                warn!(pair = %s.instrument(), error = %e, "Signal evaluation failed");
                report.record_failure(s.instrument(), e.to_string());
            }
        }
    }

    info!(
        buy = report.buy.len(),
        sell = report.sell.len(),
        failed = report.failed.len(),
        "Scan complete"
    );
    report
}
