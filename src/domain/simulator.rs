//! Walk-forward position simulation.
//!
//! The simulator is a FLAT / LONG / SHORT state machine driven bar by bar over
//! a candle series and its precomputed [`IndicatorSet`]. At most one position
//! is open at a time. Cash is debited by `size * entry` when a position opens
//! and credited by `size * exit` when it closes, for either side. For a short
//! the balance therefore moves opposite to the trade's P&L.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::candle::CandleSeries;
use super::error::CfTraderError;
use super::indicator::IndicatorSet;
use super::position::{ExitReason, Position, Side, Trade};
use super::signal::{Evaluation, evaluate};
use super::strategy::StrategyConfig;

/// Fraction of the current balance committed to each new position.
pub const RISK_FRACTION: f64 = 0.10;

/// Cooperative cancellation flag shared between a running backtest and its
/// caller. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Why a bar ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceReason {
    Warmup,
    SkipCf,
    SkipAdx,
    SkipDi,
    SkipSize,
    SkipLastBar,
    Enter,
    Hold,
    Exit,
    ForcedExit,
}

impl TraceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceReason::Warmup => "warmup",
            TraceReason::SkipCf => "skip_cf",
            TraceReason::SkipAdx => "skip_adx",
            TraceReason::SkipDi => "skip_di",
            TraceReason::SkipSize => "skip_size",
            TraceReason::SkipLastBar => "skip_last_bar",
            TraceReason::Enter => "enter",
            TraceReason::Hold => "hold",
            TraceReason::Exit => "exit",
            TraceReason::ForcedExit => "forced_exit",
        }
    }
}

/// One row of the per-bar debug trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarTrace {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub main_cf: f64,
    pub second_cf: f64,
    pub atr_short: f64,
    pub atr_long: f64,
    pub adx: f64,
    pub in_position: bool,
    pub reason: TraceReason,
    pub window_main: usize,
    pub window_second: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub debug_trace: Vec<BarTrace>,
}

pub struct PositionSimulator<'a> {
    series: &'a CandleSeries,
    indicators: &'a IndicatorSet,
    adx_threshold: f64,
    initial_balance: f64,
    balance: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    trace: Vec<BarTrace>,
    trace_limit: Option<usize>,
}

impl<'a> PositionSimulator<'a> {
    pub fn new(series: &'a CandleSeries, indicators: &'a IndicatorSet, config: &StrategyConfig) -> Self {
        PositionSimulator {
            series,
            indicators,
            adx_threshold: config.adx_threshold,
            initial_balance: config.initial_equity,
            balance: config.initial_equity,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(series.len()),
            trace: Vec::new(),
            trace_limit: None,
        }
    }

    /// Records a debug row per bar, keeping at most `max_rows`.
    pub fn with_trace(mut self, max_rows: usize) -> Self {
        self.trace_limit = Some(max_rows);
        self
    }

    pub fn state(&self) -> Option<Side> {
        self.position.as_ref().map(|p| p.side)
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Runs the full loop and force-closes whatever is still open on the last
    /// candle.
    pub fn run(mut self, cancel: &CancelToken) -> Result<SimulationOutcome, CfTraderError> {
        let Some(first) = self.series.first() else {
            return Ok(self.finish());
        };
        self.record_equity(first.timestamp, first.close);
        self.record_trace(0, TraceReason::Warmup);

        for i in 1..self.series.len() {
            if cancel.is_cancelled() {
                return Err(CfTraderError::Cancelled);
            }
            let reason = self.step(i);
            let candle = &self.series[i];
            self.record_equity(candle.timestamp, candle.close);
            self.record_trace(i, reason);
        }

        Ok(self.finish())
    }

    /// Processes bar `i`. A bar that opens a position is not checked for an
    /// exit, and a bar that closes one does not look for a new entry.
    pub fn step(&mut self, i: usize) -> TraceReason {
        match self.position.take() {
            Some(position) => {
                let candle = &self.series[i];
                match position.triggered_exit(candle) {
                    Some((price, reason)) => {
                        self.close(position, price, candle.timestamp, reason);
                        TraceReason::Exit
                    }
                    None => {
                        self.position = Some(position);
                        TraceReason::Hold
                    }
                }
            }
            None => match evaluate(i, self.indicators, self.adx_threshold) {
                Evaluation::Enter(_) if i + 1 == self.series.len() => TraceReason::SkipLastBar,
                Evaluation::Enter(side) => self.open(side, i),
                Evaluation::Warmup => TraceReason::Warmup,
                Evaluation::NoCross => TraceReason::SkipCf,
                Evaluation::WeakTrend => TraceReason::SkipAdx,
                Evaluation::DirectionMismatch => TraceReason::SkipDi,
            },
        }
    }

    fn open(&mut self, side: Side, i: usize) -> TraceReason {
        let candle = &self.series[i];
        let size = RISK_FRACTION * self.balance / candle.close;
        if !size.is_finite() || size <= 0.0 {
            return TraceReason::SkipSize;
        }

        let position = Position::open(side, candle, i, self.indicators.atr[i], size);
        tracing::debug!(
            %side,
            index = i,
            price = position.entry_price,
            size,
            stop_loss = position.stop_loss,
            take_profit = position.take_profit,
            "opened position"
        );
        self.balance -= size * position.entry_price;
        self.position = Some(position);
        TraceReason::Enter
    }

    fn close(&mut self, position: Position, price: f64, time: NaiveDateTime, reason: ExitReason) {
        self.balance += position.settlement_value(price);
        let trade = position.close(price, time, reason);
        tracing::debug!(
            side = %trade.side,
            exit_price = trade.exit_price,
            pnl = trade.pnl,
            reason = trade.exit_reason.as_str(),
            "closed position"
        );
        self.trades.push(trade);
    }

    fn record_equity(&mut self, timestamp: NaiveDateTime, close: f64) {
        let open_value = self
            .position
            .as_ref()
            .map_or(0.0, |p| p.settlement_value(close));
        self.equity_curve.push(EquityPoint {
            timestamp,
            equity: self.balance + open_value,
        });
    }

    fn record_trace(&mut self, i: usize, reason: TraceReason) {
        let Some(limit) = self.trace_limit else {
            return;
        };
        if self.trace.len() >= limit {
            return;
        }
        let c = &self.series[i];
        let ind = self.indicators;
        self.trace.push(BarTrace {
            timestamp: c.timestamp,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            main_cf: ind.main_cf[i],
            second_cf: ind.second_cf[i],
            atr_short: ind.atr[i],
            atr_long: ind.atr_long[i],
            adx: ind.adx[i],
            in_position: self.position.is_some(),
            reason,
            window_main: ind.window_main[i],
            window_second: ind.window_second[i],
        });
    }

    fn finish(mut self) -> SimulationOutcome {
        if let (Some(position), Some(last)) = (self.position.take(), self.series.last()) {
            let (price, reason) = position
                .triggered_exit(last)
                .unwrap_or((last.close, ExitReason::EndOfData));
            self.close(position, price, last.timestamp, reason);

            let last_index = self.series.len() - 1;
            if let Some(row) = self.trace.last_mut() {
                if row.timestamp == last.timestamp {
                    row.reason = TraceReason::ForcedExit;
                    row.in_position = false;
                }
            }
            if let Some(point) = self.equity_curve.get_mut(last_index) {
                point.equity = self.balance;
            }
        }

        SimulationOutcome {
            trades: self.trades,
            initial_balance: self.initial_balance,
            final_balance: self.balance,
            equity_curve: self.equity_curve,
            debug_trace: self.trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;
    use chrono::NaiveDate;

    fn ts(i: usize) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + chrono::Duration::hours(i as i64)
    }

    fn series(hlc: &[(f64, f64, f64)]) -> CandleSeries {
        CandleSeries::new(
            hlc.iter()
                .enumerate()
                .map(|(i, &(high, low, close))| Candle {
                    timestamp: ts(i),
                    open: close,
                    high,
                    low,
                    close,
                    volume: 1.0,
                })
                .collect(),
        )
        .unwrap()
    }

    /// Indicators with a chosen MainCF path, strong trend and ATR 2.
    fn indicators(main_cf: &[f64], plus_di: f64, minus_di: f64) -> IndicatorSet {
        let n = main_cf.len();
        IndicatorSet {
            main_cf: main_cf.to_vec(),
            second_cf: vec![0.0; n],
            window_main: vec![20; n],
            window_second: vec![5; n],
            atr: vec![2.0; n],
            atr_long: vec![2.0; n],
            atr_percent: vec![2.0; n],
            adx: vec![40.0; n],
            plus_di: vec![plus_di; n],
            minus_di: vec![minus_di; n],
        }
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            initial_equity: 10_000.0,
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn long_stopped_out_at_stop_level() {
        // entry at bar 2 close 100, ATR 2 -> SL 96 / TP 106; bar 3 low 95
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (97.0, 95.0, 96.5),
            (98.0, 96.0, 97.0),
        ]);
        let ind = indicators(&[0.0, -1.0, 1.0, 1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.side, Side::Long);
        assert_eq!(t.entry_price, 100.0);
        assert_eq!(t.exit_price, 96.0);
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.entry_time, ts(2));
        assert_eq!(t.exit_time, ts(3));
        // size = 0.1 * 10000 / 100 = 10 -> pnl = -40
        assert!((t.size - 10.0).abs() < 1e-9);
        assert!((t.pnl + 40.0).abs() < 1e-9);
        assert!((out.final_balance - 9_960.0).abs() < 1e-9);
    }

    #[test]
    fn short_take_profit_credits_exit_notional() {
        // SHORT at 100 -> SL 104 / TP 94; bar 3 low 93
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (100.0, 93.0, 94.5),
            (95.0, 93.0, 94.0),
        ]);
        let ind = indicators(&[0.0, 1.0, -1.0, -1.0, -1.0], 10.0, 30.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.side, Side::Short);
        assert_eq!(t.exit_price, 94.0);
        assert_eq!(t.exit_reason, ExitReason::TakeProfit);
        assert!((t.pnl - 60.0).abs() < 1e-9);
        // 10_000 - 10 * 100 + 10 * 94
        assert!((out.final_balance - 9_940.0).abs() < 1e-9);
        assert!((out.equity_curve[3].equity - 9_940.0).abs() < 1e-9);
    }

    #[test]
    fn open_short_marked_at_close_notional() {
        // SHORT at 100, held through bar 3 (close 98), forced out at 97
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (99.0, 97.0, 98.0),
            (98.0, 96.0, 97.0),
        ]);
        let ind = indicators(&[0.0, 1.0, -1.0, -1.0, -1.0], 10.0, 30.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .run(&CancelToken::new())
            .unwrap();

        assert!((out.equity_curve[2].equity - 10_000.0).abs() < 1e-9);
        assert!((out.equity_curve[3].equity - 9_980.0).abs() < 1e-9);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::EndOfData);
        assert!((t.pnl - 30.0).abs() < 1e-9);
        assert!((out.final_balance - 9_970.0).abs() < 1e-9);
    }

    #[test]
    fn open_position_force_closed_at_last_close() {
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (102.0, 99.0, 101.0),
            (103.0, 100.0, 102.0),
        ]);
        let ind = indicators(&[0.0, -1.0, 1.0, 1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .with_trace(100)
            .run(&CancelToken::new())
            .unwrap();

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.exit_price, 102.0);
        assert_eq!(t.exit_reason, ExitReason::EndOfData);
        assert_eq!(t.exit_time, ts(4));
        assert!((out.final_balance - 10_020.0).abs() < 1e-9);
        assert_eq!(out.debug_trace.last().unwrap().reason, TraceReason::ForcedExit);
        assert!((out.equity_curve.last().unwrap().equity - out.final_balance).abs() < 1e-9);
    }

    #[test]
    fn no_entry_on_final_candle() {
        let s = series(&[(101.0, 99.0, 100.0); 3]);
        let ind = indicators(&[0.0, -1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .with_trace(10)
            .run(&CancelToken::new())
            .unwrap();
        assert!(out.trades.is_empty());
        assert_eq!(out.debug_trace[2].reason, TraceReason::SkipLastBar);
        assert_eq!(out.final_balance, 10_000.0);
    }

    #[test]
    fn exit_bar_does_not_reenter() {
        // bar 3 stops out and has another upward cross; it must not reopen
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (97.0, 95.0, 96.5),
            (98.0, 96.0, 97.0),
        ]);
        let ind = indicators(&[0.0, -1.0, 1.0, -1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .with_trace(10)
            .run(&CancelToken::new())
            .unwrap();
        let reasons: Vec<_> = out.debug_trace.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                TraceReason::Warmup,
                TraceReason::Warmup,
                TraceReason::Enter,
                TraceReason::Exit,
                TraceReason::SkipLastBar,
            ]
        );
        assert_eq!(out.trades.len(), 1);
    }

    #[test]
    fn zero_close_skips_entry() {
        let s = series(&[
            (1.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
        ]);
        let ind = indicators(&[0.0, -1.0, 1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .with_trace(10)
            .run(&CancelToken::new())
            .unwrap();
        assert!(out.trades.is_empty());
        assert_eq!(out.debug_trace[2].reason, TraceReason::SkipSize);
    }

    #[test]
    fn equity_marks_open_position_to_close() {
        let s = series(&[
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (101.0, 99.0, 100.0),
            (105.0, 99.0, 104.0),
            (105.0, 99.0, 104.0),
        ]);
        let ind = indicators(&[0.0, -1.0, 1.0, 1.0, 1.0], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(out.equity_curve.len(), 5);
        assert!((out.equity_curve[2].equity - 10_000.0).abs() < 1e-9);
        // 10 units marked at 104
        assert!((out.equity_curve[3].equity - 10_040.0).abs() < 1e-9);
    }

    #[test]
    fn trace_capped_at_limit() {
        let s = series(&[(101.0, 99.0, 100.0); 10]);
        let ind = indicators(&[0.0; 10], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .with_trace(4)
            .run(&CancelToken::new())
            .unwrap();
        assert_eq!(out.debug_trace.len(), 4);
        assert_eq!(out.debug_trace[3].reason, TraceReason::SkipCf);
    }

    #[test]
    fn trace_disabled_by_default() {
        let s = series(&[(101.0, 99.0, 100.0); 5]);
        let ind = indicators(&[0.0; 5], 30.0, 10.0);
        let out = PositionSimulator::new(&s, &ind, &config())
            .run(&CancelToken::new())
            .unwrap();
        assert!(out.debug_trace.is_empty());
    }

    #[test]
    fn cancelled_token_stops_run() {
        let s = series(&[(101.0, 99.0, 100.0); 5]);
        let ind = indicators(&[0.0; 5], 30.0, 10.0);
        let token = CancelToken::new();
        token.cancel();
        let err = PositionSimulator::new(&s, &ind, &config())
            .run(&token)
            .unwrap_err();
        assert!(matches!(err, CfTraderError::Cancelled));
    }

    #[test]
    fn cancel_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn step_reports_state() {
        let s = series(&[(101.0, 99.0, 100.0); 4]);
        let ind = indicators(&[0.0, -1.0, 1.0, 1.0], 30.0, 10.0);
        let cfg = config();
        let mut sim = PositionSimulator::new(&s, &ind, &cfg);
        assert_eq!(sim.step(1), TraceReason::Warmup);
        assert_eq!(sim.state(), None);
        assert_eq!(sim.step(2), TraceReason::Enter);
        assert_eq!(sim.state(), Some(Side::Long));
        assert!((sim.balance() - 9_000.0).abs() < 1e-9);
        assert_eq!(sim.step(3), TraceReason::Hold);
    }
}
