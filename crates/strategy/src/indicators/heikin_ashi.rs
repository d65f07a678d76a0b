use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result};

/// Colour of a Heikin-Ashi candle. A doji (`close == open`) counts as green.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleColor {
    Green,
    Red,
}

/// Heikin-Ashi candle, index-aligned with the raw candle it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeikinAshiCandle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HeikinAshiCandle {
    pub fn color(&self) -> CandleColor {
        if self.close >= self.open {
            CandleColor::Green
        } else {
            CandleColor::Red
        }
    }

    pub fn is_green(&self) -> bool {
        self.color() == CandleColor::Green
    }

    pub fn is_red(&self) -> bool {
        self.color() == CandleColor::Red
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Body as a percentage of the full high-low range.
    /// A zero-range candle has no measurable body and reports 0.
    pub fn body_pct(&self) -> f64 {
        let range = self.range();
        if range > 0.0 {
            self.body() / range * 100.0
        } else {
            0.0
        }
    }
}

/// Heikin-Ashi transform.
///
/// - Close = (Open + High + Low + Close) / 4, from the raw candle
/// - Open  = (raw Open + raw Close) / 2 for the first candle,
///   then (previous HA Open + previous HA Close) / 2
/// - High  = max(raw High, HA Open, HA Close)
/// - Low   = min(raw Low, HA Open, HA Close)
#[derive(Debug, Clone, Copy, Default)]
pub struct HeikinAshi;

impl HeikinAshi {
    /// Transform raw candles into Heikin-Ashi candles in one forward pass.
    ///
    /// The previous HA open/close pair is threaded through the pass as a fold
    /// accumulator, so the transform holds no state between calls.
    pub fn transform(candles: &[Candle]) -> Result<Vec<HeikinAshiCandle>> {
        if candles.is_empty() {
            return Err(Error::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let mut out = Vec::with_capacity(candles.len());
        let mut prev: Option<(f64, f64)> = None;

        for (index, raw) in candles.iter().enumerate() {
            raw.validate(index)?;
            let ha = Self::step(prev, raw);
            prev = Some((ha.open, ha.close));
            out.push(ha);
        }

        Ok(out)
    }

    /// One step of the recurrence. `prev` is the previous (HA open, HA close).
    fn step(prev: Option<(f64, f64)>, raw: &Candle) -> HeikinAshiCandle {
        let close = (raw.open + raw.high + raw.low + raw.close) / 4.0;
        let open = match prev {
            Some((prev_open, prev_close)) => (prev_open + prev_close) / 2.0,
            None => (raw.open + raw.close) / 2.0,
        };
        HeikinAshiCandle {
            timestamp: raw.timestamp,
            open,
            high: raw.high.max(open).max(close),
            low: raw.low.min(open).min(close),
            close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(i: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i);
        Candle::new(ts, o, h, l, c)
    }

    #[test]
    fn empty_input_is_insufficient() {
        let err = HeikinAshi::transform(&[]).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 1, actual: 0 }));
    }

    #[test]
    fn first_candle_is_seeded_from_raw_open_close() {
        let ha = HeikinAshi::transform(&[candle(0, 10.0, 14.0, 8.0, 12.0)]).unwrap();
        assert_eq!(ha.len(), 1);
        assert_eq!(ha[0].open, 11.0);
        assert_eq!(ha[0].close, 11.0);
        assert_eq!(ha[0].high, 14.0);
        assert_eq!(ha[0].low, 8.0);
    }

    #[test]
    fn known_two_candle_sequence() {
        let ha = HeikinAshi::transform(&[
            candle(0, 10.0, 14.0, 8.0, 12.0),
            candle(1, 12.0, 13.0, 11.0, 12.5),
        ])
        .unwrap();
        // close = (12 + 13 + 11 + 12.5) / 4 = 12.125, open = (11 + 11) / 2 = 11
        assert_eq!(ha[1].open, 11.0);
        assert_eq!(ha[1].close, 12.125);
        assert_eq!(ha[1].high, 13.0);
        assert_eq!(ha[1].low, 11.0);
        assert_eq!(ha[1].color(), CandleColor::Green);
    }

    #[test]
    fn invalid_candle_is_surfaced_with_its_index() {
        let err = HeikinAshi::transform(&[
            candle(0, 10.0, 14.0, 8.0, 12.0),
            candle(1, 12.0, 11.0, 10.0, 12.5),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { index: 1, .. }));
    }

    #[test]
    fn doji_is_green() {
        let c = HeikinAshiCandle {
            timestamp: Utc::now(),
            open: 5.0,
            high: 6.0,
            low: 4.0,
            close: 5.0,
        };
        assert!(c.is_green());
    }

    #[test]
    fn zero_range_body_pct_is_zero() {
        let c = HeikinAshiCandle {
            timestamp: Utc::now(),
            open: 5.0,
            high: 5.0,
            low: 5.0,
            close: 5.0,
        };
        assert_eq!(c.body_pct(), 0.0);
    }

    #[test]
    fn body_pct_of_half_body_candle() {
        let c = HeikinAshiCandle {
            timestamp: Utc::now(),
            open: 97.25,
            high: 98.75,
            low: 96.75,
            close: 98.25,
        };
        assert_eq!(c.body_pct(), 50.0);
    }
}
