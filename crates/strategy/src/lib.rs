pub mod config;
pub mod detector;
pub mod indicators;
pub mod scanner;

pub use config::{BacktestSettings, MarketConfig, ScheduleConfig, StrategyFileConfig, StrategyParams};
pub use detector::{classify_pair, Analysis, SignalDetector};
pub use indicators::{BandPoint, BollingerBands, CandleColor, HeikinAshi, HeikinAshiCandle};
pub use scanner::{scan, ScanReport};
