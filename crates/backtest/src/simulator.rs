use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use common::{
    Candle, CandleSeries, Direction, Error, PositionSizing, Result, Signal, SignalKind, Trade,
};
use strategy::{BacktestSettings, SignalDetector, StrategyFileConfig};

/// Position state of the simulated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionState {
    #[default]
    Flat,
    Long,
    Short,
}

/// A position that is open at the end of the data. Not marked to market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: f64,
}

impl PositionState {
    fn of(position: Option<&OpenPosition>) -> Self {
        match position.map(|p| p.direction) {
            None => PositionState::Flat,
            Some(Direction::Long) => PositionState::Long,
            Some(Direction::Short) => PositionState::Short,
        }
    }
}

impl OpenPosition {
    fn close(self, exit_index: usize, exit: &Candle) -> Trade {
        let pnl = match self.direction {
            Direction::Long => (exit.close - self.entry_price) * self.quantity,
            Direction::Short => (self.entry_price - exit.close) * self.quantity,
        };
        Trade {
            direction: self.direction,
            entry_index: self.entry_index,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            exit_index,
            exit_time: exit.timestamp,
            exit_price: exit.close,
            quantity: self.quantity,
            pnl,
        }
    }
}

/// Everything one backtest run produced for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestOutcome {
    pub instrument: String,
    pub candles: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub initial_capital: f64,
    pub final_capital: f64,
    /// Closed trades, in exit order.
    pub trades: Vec<Trade>,
    pub open_position: Option<OpenPosition>,
    /// Share of closed trades with positive PnL, 0 when none closed.
    pub win_rate: f64,
    pub total_return_pct: f64,
}

impl BacktestOutcome {
    pub fn final_state(&self) -> PositionState {
        PositionState::of(self.open_position.as_ref())
    }

    pub fn winning_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.pnl > 0.0).count()
    }

    pub fn losing_trades(&self) -> usize {
        self.trades.iter().filter(|t| t.pnl < 0.0).count()
    }

    pub fn total_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn signals_seen(&self) -> usize {
        self.buy_signals + self.sell_signals
    }
}

/// Replays the signal rule over history and trades every transition.
///
/// State machine per instrument, starting flat:
/// - flat + BUY opens a long, flat + SELL opens a short (unless `long_only`)
/// - long + SELL and short + BUY close the position and return to flat;
///   the opposite side is not re-entered in the same step
/// - a signal matching the open side is ignored
///
/// Entries and exits fill at the raw close of the confirmation candle.
/// Capital only changes when a trade closes.
#[derive(Debug, Clone)]
pub struct Backtester {
    detector: SignalDetector,
    settings: BacktestSettings,
}

impl Backtester {
    pub fn new(detector: SignalDetector, settings: BacktestSettings) -> Self {
        info!(
            capital = settings.initial_capital,
            sizing = ?settings.position_sizing,
            long_only = settings.long_only,
            "Backtester initialized"
        );
        Self { detector, settings }
    }

    pub fn from_config(cfg: &StrategyFileConfig) -> Self {
        Self::new(
            SignalDetector::new(cfg.strategy.clone()),
            cfg.backtest.clone(),
        )
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Detect every signal in `series` and simulate trading them.
    ///
    /// HA and band values at index i only use candles up to i, so evaluating
    /// the whole series once gives the same signals as growing it candle by
    /// candle.
    pub fn run(&self, series: &CandleSeries) -> Result<BacktestOutcome> {
        let signals = self.detector.detect_series(series)?;
        self.replay(series, &signals)
    }

    /// Simulate trading a given, index-ordered signal sequence over `series`.
    pub fn replay(&self, series: &CandleSeries, signals: &[Signal]) -> Result<BacktestOutcome> {
        let candles = series.candles();
        let mut ledger = Ledger::new(self.settings.initial_capital, self.settings.position_sizing);
        let mut last_index: Option<usize> = None;
        let (mut buy_signals, mut sell_signals) = (0, 0);

        for signal in signals {
            if let Some(prev) = last_index {
                if signal.index < prev {
                    return Err(Error::Other(format!(
                        "signals out of order: index {} after {prev}",
                        signal.index
                    )));
                }
            }
            last_index = Some(signal.index);

            let candle = candles.get(signal.index).ok_or(Error::InsufficientData {
                required: signal.index + 1,
                actual: candles.len(),
            })?;

            match signal.kind {
                SignalKind::Buy => buy_signals += 1,
                SignalKind::Sell => sell_signals += 1,
            }
            ledger.apply(signal, candle, self.settings.long_only);
        }

        let closed = ledger.trades.len();
        let win_rate = if closed > 0 {
            ledger.trades.iter().filter(|t| t.is_win()).count() as f64 / closed as f64
        } else {
            0.0
        };
        let initial = self.settings.initial_capital;
        let total_return_pct = if initial > 0.0 {
            (ledger.capital - initial) / initial * 100.0
        } else {
            0.0
        };

        info!(
            pair = %series.instrument(),
            trades = closed,
            final_capital = ledger.capital,
            return_pct = total_return_pct,
            "Backtest complete"
        );

        Ok(BacktestOutcome {
            instrument: series.instrument().to_string(),
            candles: candles.len(),
            buy_signals,
            sell_signals,
            initial_capital: initial,
            final_capital: ledger.capital,
            trades: ledger.trades,
            open_position: ledger.position,
            win_rate,
            total_return_pct,
        })
    }
}

/// Mutable account state threaded through one replay.
struct Ledger {
    capital: f64,
    sizing: PositionSizing,
    position: Option<OpenPosition>,
    trades: Vec<Trade>,
    last_exit_index: Option<usize>,
}

impl Ledger {
    fn new(capital: f64, sizing: PositionSizing) -> Self {
        Self {
            capital,
            sizing,
            position: None,
            trades: Vec::new(),
            last_exit_index: None,
        }
    }

    fn state(&self) -> PositionState {
        PositionState::of(self.position.as_ref())
    }

    fn apply(&mut self, signal: &Signal, candle: &Candle, long_only: bool) {
        match (self.state(), signal.kind) {
            (PositionState::Flat, SignalKind::Buy) => self.open(Direction::Long, signal.index, candle),
            (PositionState::Flat, SignalKind::Sell) if !long_only => {
                self.open(Direction::Short, signal.index, candle)
            }
            (PositionState::Flat, SignalKind::Sell) => {
                debug!(index = signal.index, "SELL while flat ignored (long only)");
            }
            (PositionState::Long, SignalKind::Sell) | (PositionState::Short, SignalKind::Buy) => {
                self.close(signal.index, candle)
            }
            (PositionState::Long, SignalKind::Buy) | (PositionState::Short, SignalKind::Sell) => {
                debug!(index = signal.index, kind = %signal.kind, "Already positioned, signal ignored");
            }
        }
    }

    fn open(&mut self, direction: Direction, index: usize, candle: &Candle) {
        if self.last_exit_index == Some(index) {
            debug!(index, "No re-entry on the candle that closed the last trade");
            return;
        }
        let quantity = self.sizing.quantity(self.capital, candle.close);
        if !(quantity.is_finite() && quantity > 0.0) {
            warn!(index, capital = self.capital, "Position size is zero, entry skipped");
            return;
        }
        debug!(index, %direction, price = candle.close, quantity, "Position opened");
        self.position = Some(OpenPosition {
            direction,
            entry_index: index,
            entry_time: candle.timestamp,
            entry_price: candle.close,
            quantity,
        });
    }

    fn close(&mut self, index: usize, candle: &Candle) {
        let Some(position) = self.position.take() else {
            return;
        };
        let trade = position.close(index, candle);
        self.capital += trade.pnl;
        self.last_exit_index = Some(index);
        debug!(
            index,
            direction = %trade.direction,
            price = trade.exit_price,
            pnl = trade.pnl,
            "Position closed"
        );
        self.trades.push(trade);
    }
}
