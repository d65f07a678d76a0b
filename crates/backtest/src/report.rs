use std::fmt;

use serde::Serialize;

use crate::simulator::BacktestOutcome;

impl fmt::Display for BacktestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Report for {} ===", self.instrument)?;
        writeln!(f, "Candles: {}", self.candles)?;
        writeln!(
            f,
            "Signals: {} (BUY {}, SELL {})",
            self.signals_seen(),
            self.buy_signals,
            self.sell_signals
        )?;
        writeln!(f, "Initial Capital: ${:.2}", self.initial_capital)?;
        writeln!(f, "Final Capital: ${:.2}", self.final_capital)?;
        writeln!(f, "Total Profit/Loss: ${:.2}", self.total_pnl())?;
        writeln!(f, "Returns: {:.2}%", self.total_return_pct)?;
        writeln!(f)?;
        writeln!(f, "Total Trades: {}", self.trades.len())?;
        writeln!(f, "Winning Trades: {}", self.winning_trades())?;
        writeln!(f, "Losing Trades: {}", self.losing_trades())?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate * 100.0)?;

        if !self.trades.is_empty() {
            writeln!(f)?;
            for t in &self.trades {
                writeln!(
                    f,
                    "{} | {:5} | {:.4} -> {:.4} | qty {:.6} | PnL {:+.2}",
                    t.exit_time.format("%Y-%m-%d %H:%M"),
                    t.direction.to_string(),
                    t.entry_price,
                    t.exit_price,
                    t.quantity,
                    t.pnl
                )?;
            }
        }

        if let Some(open) = &self.open_position {
            writeln!(
                f,
                "Open {} since {} at {:.4} (not counted)",
                open.direction,
                open.entry_time.format("%Y-%m-%d %H:%M"),
                open.entry_price
            )?;
        }
        Ok(())
    }
}

/// Totals across the pairs of one backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestSummary {
    pub pairs_tested: usize,
    pub total_signals: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub total_trades: usize,
    pub winning_trades: usize,
    /// Winning share of all closed trades across pairs, 0 when none closed.
    pub win_rate: f64,
    pub total_pnl: f64,
}

impl BacktestSummary {
    pub fn from_outcomes(outcomes: &[BacktestOutcome]) -> Self {
        let mut summary = outcomes.iter().fold(Self::default(), |mut acc, o| {
            acc.pairs_tested += 1;
            acc.total_signals += o.signals_seen();
            acc.buy_signals += o.buy_signals;
            acc.sell_signals += o.sell_signals;
            acc.total_trades += o.trades.len();
            acc.winning_trades += o.winning_trades();
            acc.total_pnl += o.total_pnl();
            acc
        });
        if summary.total_trades > 0 {
            summary.win_rate = summary.winning_trades as f64 / summary.total_trades as f64;
        }
        summary
    }
}

impl fmt::Display for BacktestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Summary ===")?;
        writeln!(f, "Total Pairs Tested: {}", self.pairs_tested)?;
        writeln!(f, "Total Signals: {}", self.total_signals)?;
        writeln!(f, "Total Buy Signals: {}", self.buy_signals)?;
        writeln!(f, "Total Sell Signals: {}", self.sell_signals)?;
        writeln!(f, "Total Trades: {}", self.total_trades)?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate * 100.0)?;
        writeln!(f, "Total Profit/Loss: ${:.2}", self.total_pnl)
    }
}
