use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use common::{Error, PositionSizing, Result, Timeframe};

/// Top-level strategy config file (TOML). Every section is optional.
///
/// Example `config/strategy.toml`:
/// ```toml
/// [strategy]
/// period = 20
/// std_multiplier = 2.0
/// min_body_pct = 30.0
/// lookback_pairs = 1
///
/// [market]
/// timeframe = "2h"
/// candle_limit = 100
///
/// [schedule]
/// utc_offset_minutes = 330
/// times = ["09:30", "11:30", "13:30"]
///
/// [backtest]
/// initial_capital = 10000.0
/// position_sizing = { type = "fixed", quantity = 1.0 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyFileConfig {
    pub strategy: StrategyParams,
    pub market: MarketConfig,
    pub schedule: ScheduleConfig,
    pub backtest: BacktestSettings,
}

/// Tunables of the signal rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Bollinger lookback.
    pub period: usize,
    /// Standard deviation multiplier for the bands.
    pub std_multiplier: f64,
    /// Minimum body size of the confirmation candle, in percent of its range.
    pub min_body_pct: f64,
    /// How many of the most recent adjacent pairs a live scan inspects.
    pub lookback_pairs: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            period: 20,
            std_multiplier: 2.0,
            min_body_pct: 30.0,
            lookback_pairs: 1,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<()> {
        if self.period < 2 {
            return Err(Error::Config(format!(
                "strategy.period must be >= 2, got {}",
                self.period
            )));
        }
        if !(self.std_multiplier.is_finite() && self.std_multiplier > 0.0) {
            return Err(Error::Config(format!(
                "strategy.std_multiplier must be positive, got {}",
                self.std_multiplier
            )));
        }
        if !(0.0..=100.0).contains(&self.min_body_pct) {
            return Err(Error::Config(format!(
                "strategy.min_body_pct must be within 0..=100, got {}",
                self.min_body_pct
            )));
        }
        if self.lookback_pairs == 0 {
            return Err(Error::Config("strategy.lookback_pairs must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketConfig {
    pub timeframe: Timeframe,
    /// Candles fetched per pair for a live scan.
    pub candle_limit: usize,
    /// Drop a still-forming last candle from fetched data.
    pub closed_only: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::H2,
            candle_limit: 100,
            closed_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Offset of the wall clock the times are written in (IST = 330).
    pub utc_offset_minutes: i32,
    /// Local "HH:MM" times at which a scan runs each day.
    pub times: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 330,
            times: ["09:30", "11:30", "13:30", "15:30", "17:30", "19:30", "21:30"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured times, sorted and de-duplicated.
    pub fn parsed_times(&self) -> Result<Vec<NaiveTime>> {
        if self.times.is_empty() {
            return Err(Error::Config("schedule.times must not be empty".into()));
        }
        let mut times = self
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|e| {
                    Error::Config(format!("schedule time '{t}' is not HH:MM: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();
        Ok(times)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub position_sizing: PositionSizing,
    /// Spot-style simulation: SELL signals only close longs, never open shorts.
    pub long_only: bool,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_sizing: PositionSizing::AllIn,
            long_only: false,
        }
    }
}

impl StrategyFileConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("invalid strategy config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Strategy config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.schedule.parsed_times()?;
        if self.market.candle_limit < self.strategy.period + 2 {
            return Err(Error::Config(format!(
                "market.candle_limit ({}) must cover period + 2 ({})",
                self.market.candle_limit,
                self.strategy.period + 2
            )));
        }
        if !(self.backtest.initial_capital.is_finite() && self.backtest.initial_capital > 0.0) {
            return Err(Error::Config(format!(
                "backtest.initial_capital must be positive, got {}",
                self.backtest.initial_capital
            )));
        }
        if let PositionSizing::Fixed { quantity } = self.backtest.position_sizing {
            if !(quantity.is_finite() && quantity > 0.0) {
                return Err(Error::Config(format!(
                    "backtest.position_sizing.quantity must be positive, got {quantity}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = StrategyFileConfig::from_toml("").unwrap();
        assert_eq!(cfg, StrategyFileConfig::default());
        assert_eq!(cfg.strategy.period, 20);
        assert_eq!(cfg.strategy.std_multiplier, 2.0);
        assert_eq!(cfg.strategy.min_body_pct, 30.0);
        assert_eq!(cfg.market.timeframe, Timeframe::H2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = StrategyFileConfig::from_toml(
            r#"
            [strategy]
            min_body_pct = 45.0

            [backtest]
            position_sizing = { type = "fixed", quantity = 2.5 }
            long_only = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategy.min_body_pct, 45.0);
        assert_eq!(cfg.strategy.period, 20);
        assert_eq!(
            cfg.backtest.position_sizing,
            PositionSizing::Fixed { quantity: 2.5 }
        );
        assert!(cfg.backtest.long_only);
    }

    #[test]
    fn timeframe_is_read_from_its_interval_name() {
        let cfg = StrategyFileConfig::from_toml("[market]\ntimeframe = \"1h\"\n").unwrap();
        assert_eq!(cfg.market.timeframe, Timeframe::H1);
    }

    #[test]
    fn period_below_two_is_rejected() {
        let err = StrategyFileConfig::from_toml("[strategy]\nperiod = 1\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn body_threshold_above_hundred_is_rejected() {
        let err = StrategyFileConfig::from_toml("[strategy]\nmin_body_pct = 120.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn candle_limit_must_cover_detector_minimum() {
        let err = StrategyFileConfig::from_toml("[market]\ncandle_limit = 21\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn schedule_times_are_sorted_and_deduplicated() {
        let schedule = ScheduleConfig {
            utc_offset_minutes: 0,
            times: vec!["13:30".into(), "09:30".into(), "13:30".into()],
        };
        let times = schedule.parsed_times().unwrap();
        assert_eq!(
            times,
            vec![
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn malformed_schedule_time_is_rejected() {
        let err = StrategyFileConfig::from_toml("[schedule]\ntimes = [\"9h30\"]\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = StrategyFileConfig::load("does/not/exist/strategy.toml").unwrap();
        assert_eq!(cfg, StrategyFileConfig::default());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let cfg = StrategyFileConfig::from_toml(include_str!("../../../config/strategy.toml")).unwrap();
        assert_eq!(cfg, StrategyFileConfig::default());
    }
}
