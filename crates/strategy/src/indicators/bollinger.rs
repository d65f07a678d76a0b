use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

/// One defined point of the Bollinger envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPoint {
    pub timestamp: DateTime<Utc>,
    pub sma: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Bollinger Bands over raw closes.
///
/// - Middle: SMA(close, period)
/// - Upper:  middle + multiplier * stddev(close, period)
/// - Lower:  middle - multiplier * stddev(close, period)
///
/// Uses the sample standard deviation (divide by N - 1).
/// Lookback: period - 1. Earlier indices have no band.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub period: usize,
    pub std_multiplier: f64,
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self::new(20, 2.0)
    }
}

impl BollingerBands {
    pub fn new(period: usize, std_multiplier: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self {
            period,
            std_multiplier,
        }
    }

    /// Compute the envelope, aligned 1:1 with `candles`.
    /// Fails if there are fewer than `period` candles.
    pub fn compute(&self, candles: &[Candle]) -> Result<Vec<Option<BandPoint>>> {
        if candles.len() < self.period {
            return Err(Error::InsufficientData {
                required: self.period,
                actual: candles.len(),
            });
        }

        let mut out = Vec::with_capacity(candles.len());
        for (i, candle) in candles.iter().enumerate() {
            candle.validate(i)?;
            if i + 1 < self.period {
                out.push(None);
                continue;
            }
            let window = &candles[i + 1 - self.period..=i];
            out.push(Some(self.point(candle.timestamp, window)));
        }

        Ok(out)
    }

    fn point(&self, timestamp: DateTime<Utc>, window: &[Candle]) -> BandPoint {
        let n = window.len() as f64;
        let sma = window.iter().map(|c| c.close).sum::<f64>() / n;
        let variance = window
            .iter()
            .map(|c| {
                let diff = c.close - sma;
                diff * diff
            })
            .sum::<f64>()
            / (n - 1.0);
        let width = self.std_multiplier * variance.sqrt();

        BandPoint {
            timestamp,
            sma,
            upper: sma + width,
            lower: sma - width,
        }
    }
}
