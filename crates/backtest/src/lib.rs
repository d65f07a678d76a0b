pub mod report;
pub mod simulator;

pub use report::BacktestSummary;
pub use simulator::{BacktestOutcome, Backtester, OpenPosition, PositionState};
