use std::ops::Range;

use tracing::debug;

use common::{Candle, CandleSeries, Error, Result, Signal, SignalKind};

use crate::config::StrategyParams;
use crate::indicators::{BandPoint, BollingerBands, HeikinAshi, HeikinAshiCandle};

/// Heikin-Ashi candles and Bollinger points computed over the same candles.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub heikin_ashi: Vec<HeikinAshiCandle>,
    pub bands: Vec<Option<BandPoint>>,
}

/// Reversal rule over an adjacent pair `(prev, current)` of HA candles.
///
/// BUY: `prev` is red and reaches the lower band with its close or low, then
/// `current` is green with a body of at least `min_body_pct` of its range.
/// SELL mirrors it at the upper band. Touches are inclusive. The colour
/// requirements make the two outcomes mutually exclusive.
pub fn classify_pair(
    prev: &HeikinAshiCandle,
    band: &BandPoint,
    current: &HeikinAshiCandle,
    min_body_pct: f64,
) -> Option<SignalKind> {
    if current.body_pct() < min_body_pct {
        return None;
    }

    let touches_lower = prev.close <= band.lower || prev.low <= band.lower;
    let touches_upper = prev.close >= band.upper || prev.high >= band.upper;

    if prev.is_red() && touches_lower && current.is_green() {
        Some(SignalKind::Buy)
    } else if prev.is_green() && touches_upper && current.is_red() {
        Some(SignalKind::Sell)
    } else {
        None
    }
}

/// Evaluates the HA + BB reversal rule.
///
/// Live scans and backtests both go through `evaluate_pair`; they only differ
/// in which pair indices they ask about.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    params: StrategyParams,
    bands: BollingerBands,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new(StrategyParams::default())
    }
}

impl SignalDetector {
    pub fn new(params: StrategyParams) -> Self {
        let bands = BollingerBands::new(params.period, params.std_multiplier);
        Self { params, bands }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Smallest input that yields at least one evaluable pair:
    /// one defined band point plus the candle after it.
    pub fn min_candles(&self) -> usize {
        self.params.period + 2
    }

    /// Compute the HA and BB series for `candles`.
    pub fn analyze(&self, candles: &[Candle]) -> Result<Analysis> {
        self.ensure_len(candles.len())?;
        Ok(Analysis {
            heikin_ashi: HeikinAshi::transform(candles)?,
            bands: self.bands.compute(candles)?,
        })
    }

    /// Evaluate the pair `(i - 1, i)`. Returns `None` when `i` is out of
    /// bounds or the band at `i - 1` is not defined yet.
    pub fn evaluate_pair(
        &self,
        heikin_ashi: &[HeikinAshiCandle],
        bands: &[Option<BandPoint>],
        i: usize,
    ) -> Option<SignalKind> {
        if i == 0 || i >= heikin_ashi.len() {
            return None;
        }
        let band = bands.get(i - 1).copied().flatten()?;
        classify_pair(
            &heikin_ashi[i - 1],
            &band,
            &heikin_ashi[i],
            self.params.min_body_pct,
        )
    }

    /// Evaluate every adjacent pair, oldest first.
    pub fn detect(
        &self,
        instrument: &str,
        heikin_ashi: &[HeikinAshiCandle],
        bands: &[Option<BandPoint>],
    ) -> Result<Vec<Signal>> {
        self.check_inputs(heikin_ashi, bands)?;
        Ok(self.detect_range(instrument, heikin_ashi, bands, 1..heikin_ashi.len()))
    }

    /// Backtest mode: every pair of the series.
    pub fn detect_series(&self, series: &CandleSeries) -> Result<Vec<Signal>> {
        let analysis = self.analyze(series.candles())?;
        self.detect(series.instrument(), &analysis.heikin_ashi, &analysis.bands)
    }

    /// Live mode: only the `lookback_pairs` most recent pairs, so with the
    /// default width of 1 just `(N - 2, N - 1)`.
    pub fn detect_latest(&self, series: &CandleSeries) -> Result<Vec<Signal>> {
        let analysis = self.analyze(series.candles())?;
        let n = analysis.heikin_ashi.len();
        let start = n.saturating_sub(self.params.lookback_pairs).max(1);
        Ok(self.detect_range(
            series.instrument(),
            &analysis.heikin_ashi,
            &analysis.bands,
            start..n,
        ))
    }

    fn detect_range(
        &self,
        instrument: &str,
        heikin_ashi: &[HeikinAshiCandle],
        bands: &[Option<BandPoint>],
        pairs: Range<usize>,
    ) -> Vec<Signal> {
        pairs
            .filter_map(|i| {
                let kind = self.evaluate_pair(heikin_ashi, bands, i)?;
                let current = &heikin_ashi[i];
                debug!(
                    pair = %instrument,
                    index = i,
                    kind = %kind,
                    body_pct = current.body_pct(),
                    "Signal detected"
                );
                Some(Signal {
                    timestamp: current.timestamp,
                    index: i,
                    kind,
                    instrument: instrument.to_string(),
                })
            })
            .collect()
    }

    fn check_inputs(
        &self,
        heikin_ashi: &[HeikinAshiCandle],
        bands: &[Option<BandPoint>],
    ) -> Result<()> {
        if heikin_ashi.len() != bands.len() {
            return Err(Error::SeriesMismatch {
                heikin_ashi: heikin_ashi.len(),
                bands: bands.len(),
            });
        }
        self.ensure_len(heikin_ashi.len())
    }

    fn ensure_len(&self, actual: usize) -> Result<()> {
        let required = self.min_candles();
        if actual < required {
            return Err(Error::InsufficientData { required, actual });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ha(open: f64, high: f64, low: f64, close: f64) -> HeikinAshiCandle {
        HeikinAshiCandle {
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
        }
    }

    fn band(lower: f64, upper: f64) -> BandPoint {
        BandPoint {
            timestamp: Utc::now(),
            sma: (lower + upper) / 2.0,
            upper,
            lower,
        }
    }

    #[test]
    fn buy_when_red_touches_lower_then_green_confirms() {
        let prev = ha(100.0, 100.0, 88.0, 94.5);
        let current = ha(97.0, 99.0, 96.0, 98.5);
        let kind = classify_pair(&prev, &band(95.0, 105.0), &current, 30.0);
        assert_eq!(kind, Some(SignalKind::Buy));
    }

    #[test]
    fn sell_when_green_touches_upper_then_red_confirms() {
        let prev = ha(100.0, 112.0, 100.0, 105.5);
        let current = ha(103.0, 104.0, 101.0, 101.5);
        let kind = classify_pair(&prev, &band(95.0, 105.0), &current, 30.0);
        assert_eq!(kind, Some(SignalKind::Sell));
    }

    #[test]
    fn candle_exactly_on_lower_band_counts_as_touch() {
        let prev = ha(100.0, 100.0, 95.0, 95.0);
        let current = ha(97.0, 99.0, 96.0, 98.5);
        assert_eq!(
            classify_pair(&prev, &band(95.0, 105.0), &current, 30.0),
            Some(SignalKind::Buy)
        );
        let above = band(94.999, 105.0);
        assert_eq!(classify_pair(&prev, &above, &current, 30.0), None);
    }

    #[test]
    fn exactly_thirty_percent_body_qualifies() {
        let prev = ha(100.0, 100.0, 90.0, 94.0);
        // body 3 over range 10
        let current = ha(96.0, 100.0, 90.0, 99.0);
        assert_eq!(current.body_pct(), 30.0);
        assert_eq!(
            classify_pair(&prev, &band(95.0, 105.0), &current, 30.0),
            Some(SignalKind::Buy)
        );
    }

    #[test]
    fn just_under_thirty_percent_body_does_not_qualify() {
        let prev = ha(100.0, 100.0, 90.0, 94.0);
        // body 2.9999 over range 10 = 29.999%
        let current = ha(96.0, 100.0, 90.0, 98.9999);
        assert!(current.body_pct() < 30.0);
        assert_eq!(classify_pair(&prev, &band(95.0, 105.0), &current, 30.0), None);
    }

    #[test]
    fn zero_range_confirmation_never_signals() {
        let prev = ha(100.0, 100.0, 90.0, 94.0);
        let flat = ha(98.0, 98.0, 98.0, 98.0);
        assert_eq!(classify_pair(&prev, &band(95.0, 105.0), &flat, 0.0001), None);
    }

    #[test]
    fn same_colour_pair_never_signals() {
        let prev = ha(100.0, 100.0, 88.0, 94.5);
        let red_again = ha(97.0, 97.5, 90.0, 91.0);
        assert_eq!(classify_pair(&prev, &band(95.0, 105.0), &red_again, 30.0), None);
    }

    #[test]
    fn pair_without_band_is_skipped() {
        let detector = SignalDetector::default();
        let candles = vec![ha(100.0, 100.0, 88.0, 94.5), ha(97.0, 99.0, 96.0, 98.5)];
        assert_eq!(detector.evaluate_pair(&candles, &[None, None], 1), None);
        assert_eq!(detector.evaluate_pair(&candles, &[None, None], 0), None);
        assert_eq!(detector.evaluate_pair(&candles, &[None, None], 5), None);
    }

    #[test]
    fn mismatched_series_are_rejected() {
        let detector = SignalDetector::default();
        let candles = vec![ha(1.0, 1.0, 1.0, 1.0); 22];
        let err = detector.detect("X", &candles, &[None; 21]).unwrap_err();
        assert!(matches!(err, Error::SeriesMismatch { heikin_ashi: 22, bands: 21 }));
    }

    #[test]
    fn detect_requires_period_plus_two() {
        let detector = SignalDetector::default();
        let candles = vec![ha(1.0, 1.0, 1.0, 1.0); 21];
        let err = detector.detect("X", &candles, &[None; 21]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 22, actual: 21 }));
    }
}
