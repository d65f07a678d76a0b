use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One raw OHLC candle as delivered by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the candle.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume. Carried through, never read by the indicators.
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    /// Check the OHLC ordering invariant: `low <= min(open, close)` and
    /// `high >= max(open, close)`, with every price finite.
    pub fn validate(&self, index: usize) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidCandle {
                index,
                reason: format!(
                    "non-finite price (o={}, h={}, l={}, c={})",
                    self.open, self.high, self.low, self.close
                ),
            });
        }
        if self.low > self.open.min(self.close) {
            return Err(Error::InvalidCandle {
                index,
                reason: format!(
                    "low {} above body (open={}, close={})",
                    self.low, self.open, self.close
                ),
            });
        }
        if self.high < self.open.max(self.close) {
            return Err(Error::InvalidCandle {
                index,
                reason: format!(
                    "high {} below body (open={}, close={})",
                    self.high, self.open, self.close
                ),
            });
        }
        Ok(())
    }
}

/// Validate every candle and require strictly increasing timestamps.
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (index, candle) in candles.iter().enumerate() {
        candle.validate(index)?;
        if index > 0 && candle.timestamp <= candles[index - 1].timestamp {
            return Err(Error::InvalidCandle {
                index,
                reason: format!(
                    "timestamp {} does not follow {}",
                    candle.timestamp,
                    candles[index - 1].timestamp
                ),
            });
        }
    }
    Ok(())
}

/// An ordered, validated candle sequence for one instrument.
///
/// Construction is the only way in, so every `CandleSeries` upholds the OHLC
/// invariant and time ordering. The candles cannot be mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    instrument: String,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(instrument: impl Into<String>, candles: Vec<Candle>) -> Result<Self> {
        validate_candles(&candles)?;
        Ok(Self {
            instrument: instrument.into(),
            candles,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

/// Direction of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
        }
    }
}

/// A reversal signal on the confirmation candle at `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub index: usize,
    pub kind: SignalKind,
    pub instrument: String,
}

/// Side of a simulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// A closed simulated trade. Only ever built at exit, so it never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub direction: Direction,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// How many units a simulated entry buys or sells.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Commit the whole current capital: `quantity = capital / entry_price`.
    #[default]
    AllIn,
    /// Always trade the same quantity.
    Fixed { quantity: f64 },
}

impl PositionSizing {
    pub fn quantity(&self, capital: f64, entry_price: f64) -> f64 {
        match self {
            PositionSizing::AllIn if entry_price > 0.0 => capital / entry_price,
            PositionSizing::AllIn => 0.0,
            PositionSizing::Fixed { quantity } => *quantity,
        }
    }
}

/// Candle interval supported by the Binance kline endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[default]
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.minutes())
    }

    /// Number of candles covering `days` calendar days.
    pub fn candles_per_days(&self, days: u32) -> usize {
        let total_minutes = i64::from(days) * 1440;
        usize::try_from(total_minutes / self.minutes()).unwrap_or(usize::MAX)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(Error::Config(format!("unsupported timeframe '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn candle_with_low_above_body_is_rejected() {
        let candle = Candle::new(at(0), 100.0, 105.0, 101.0, 102.0);
        let err = candle.validate(7).unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { index: 7, .. }));
    }

    #[test]
    fn candle_with_high_below_body_is_rejected() {
        let candle = Candle::new(at(0), 100.0, 101.0, 99.0, 102.0);
        assert!(candle.validate(0).is_err());
    }

    #[test]
    fn nan_price_is_rejected() {
        let candle = Candle::new(at(0), f64::NAN, 101.0, 99.0, 100.0);
        assert!(candle.validate(0).is_err());
    }

    #[test]
    fn flat_candle_is_valid() {
        let candle = Candle::new(at(0), 100.0, 100.0, 100.0, 100.0);
        assert!(candle.validate(0).is_ok());
    }

    #[test]
    fn series_rejects_out_of_order_timestamps() {
        let candles = vec![
            Candle::new(at(2), 100.0, 101.0, 99.0, 100.0),
            Candle::new(at(1), 100.0, 101.0, 99.0, 100.0),
        ];
        let err = CandleSeries::new("BTCUSDT", candles).unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { index: 1, .. }));
    }

    #[test]
    fn series_reports_first_bad_candle_index() {
        let candles = vec![
            Candle::new(at(0), 100.0, 101.0, 99.0, 100.0),
            Candle::new(at(1), 100.0, 101.0, 99.0, 100.0),
            Candle::new(at(2), 100.0, 99.0, 98.0, 100.0),
        ];
        let err = CandleSeries::new("ETHUSDT", candles).unwrap_err();
        assert!(matches!(err, Error::InvalidCandle { index: 2, .. }));
    }

    #[test]
    fn all_in_sizing_uses_capital_over_price() {
        let qty = PositionSizing::AllIn.quantity(10_000.0, 250.0);
        assert!((qty - 40.0).abs() < 1e-12);
        assert_eq!(PositionSizing::Fixed { quantity: 3.0 }.quantity(10_000.0, 250.0), 3.0);
    }

    #[test]
    fn timeframe_parses_and_counts_candles() {
        let tf: Timeframe = "2H".parse().unwrap();
        assert_eq!(tf, Timeframe::H2);
        assert_eq!(tf.candles_per_days(7), 84);
        assert!("3h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn signal_kind_displays_uppercase() {
        assert_eq!(SignalKind::Buy.to_string(), "BUY");
        assert_eq!(SignalKind::Sell.to_string(), "SELL");
    }
}
