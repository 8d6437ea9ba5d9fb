//! Backtest orchestration.
//!
//! [`Backtester`] wires the ports to the pure core: resolve the strategy,
//! load candles, compute indicators once, simulate, aggregate metrics, and
//! only then hand the finished [`BacktestResult`] to the result port. Any
//! failure before that point leaves storage untouched.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::candle::CandleSeries;
use super::config_validation::validate_strategy_config;
use super::error::CfTraderError;
use super::indicator::IndicatorSet;
use super::metrics::Metrics;
use super::position::Trade;
use super::simulator::{BarTrace, CancelToken, EquityPoint, PositionSimulator, SimulationOutcome};
use super::strategy::Strategy;
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_port::ResultPort;
use crate::ports::strategy_port::StrategyPort;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub instrument_id: i64,
    pub strategy_name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Assigned by the result port.
    pub id: Option<i64>,
    pub instrument_id: i64,
    pub strategy_id: i64,
    pub strategy_name: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub metrics: BTreeMap<String, f64>,
    pub trades: Vec<Trade>,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug_trace: Vec<BarTrace>,
}

impl BacktestResult {
    fn assemble(request: &BacktestRequest, strategy: &Strategy, outcome: SimulationOutcome) -> Self {
        let metrics = Metrics::compute(
            &outcome.trades,
            outcome.initial_balance,
            outcome.final_balance,
            &outcome.equity_curve,
        );
        BacktestResult {
            id: None,
            instrument_id: request.instrument_id,
            strategy_id: strategy.id,
            strategy_name: strategy.name.clone(),
            start_time: request.start,
            end_time: request.end,
            total_trades: metrics.total_trades,
            winning_trades: metrics.winning_trades,
            losing_trades: metrics.losing_trades,
            win_rate: metrics.win_rate,
            total_pnl: metrics.total_pnl,
            total_return: metrics.total_return,
            initial_balance: outcome.initial_balance,
            final_balance: outcome.final_balance,
            metrics: metrics.named,
            trades: outcome.trades,
            equity_curve: outcome.equity_curve,
            debug_trace: outcome.debug_trace,
        }
    }
}

/// Per-bar debug trace settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktestOptions {
    pub debug: bool,
    pub debug_max_candles: usize,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        BacktestOptions {
            debug: false,
            debug_max_candles: 500,
        }
    }
}

impl BacktestOptions {
    /// Reads `[backtest] debug` and `debug_max_candles`.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let defaults = Self::default();
        BacktestOptions {
            debug: config.get_bool("backtest", "debug", defaults.debug),
            debug_max_candles: config
                .get_int("backtest", "debug_max_candles", defaults.debug_max_candles as i64)
                .max(0) as usize,
        }
    }
}

/// Runs the full pipeline for one strategy over an already loaded series.
/// Nothing is read from or written to storage.
pub fn simulate(
    strategy: &Strategy,
    series: &CandleSeries,
    options: BacktestOptions,
    cancel: &CancelToken,
) -> Result<SimulationOutcome, CfTraderError> {
    let indicators = IndicatorSet::compute(&strategy.config, series);
    let mut simulator = PositionSimulator::new(series, &indicators, &strategy.config);
    if options.debug {
        simulator = simulator.with_trace(options.debug_max_candles);
    }
    simulator.run(cancel)
}

pub struct Backtester<'a> {
    candles: &'a dyn CandlePort,
    strategies: &'a dyn StrategyPort,
    results: &'a dyn ResultPort,
    options: BacktestOptions,
}

impl<'a> Backtester<'a> {
    pub fn new(
        candles: &'a dyn CandlePort,
        strategies: &'a dyn StrategyPort,
        results: &'a dyn ResultPort,
    ) -> Self {
        Backtester {
            candles,
            strategies,
            results,
            options: BacktestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BacktestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run(
        &self,
        instrument_id: i64,
        strategy_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BacktestResult, CfTraderError> {
        let request = BacktestRequest {
            instrument_id,
            strategy_name: strategy_name.to_string(),
            start,
            end,
        };
        self.run_with(&request, &CancelToken::new())
    }

    pub fn run_with(
        &self,
        request: &BacktestRequest,
        cancel: &CancelToken,
    ) -> Result<BacktestResult, CfTraderError> {
        if request.start >= request.end {
            return Err(CfTraderError::InvalidTimeRange {
                start: request.start.to_string(),
                end: request.end.to_string(),
            });
        }

        let strategy = self.strategies.resolve_strategy(&request.strategy_name)?;
        validate_strategy_config(&strategy.config)?;

        let series = self
            .candles
            .fetch_candles(request.instrument_id, request.start, request.end)?;
        if series.is_empty() {
            return Err(CfTraderError::NoData {
                instrument_id: request.instrument_id,
            });
        }
        let minimum = strategy.config.min_candles();
        if series.len() < minimum {
            return Err(CfTraderError::InsufficientData {
                instrument_id: request.instrument_id,
                bars: series.len(),
                minimum,
            });
        }

        info!(
            instrument_id = request.instrument_id,
            strategy = %strategy.name,
            candles = series.len(),
            "starting backtest"
        );

        let outcome = simulate(&strategy, &series, self.options, cancel)?;
        let mut result = BacktestResult::assemble(request, &strategy, outcome);
        for trade in &result.trades {
            debug!(
                side = %trade.side,
                entry = %trade.entry_time,
                exit = %trade.exit_time,
                pnl = trade.pnl,
                "trade"
            );
        }

        let id = self.results.persist_result(&result)?;
        result.id = Some(id);

        info!(
            id,
            instrument_id = result.instrument_id,
            trades = result.total_trades,
            total_pnl = result.total_pnl,
            total_return = result.total_return,
            "backtest complete"
        );
        Ok(result)
    }

    /// Runs independent requests in parallel. Results come back in request
    /// order; one failure does not affect the others.
    pub fn run_many(
        &self,
        requests: &[BacktestRequest],
        cancel: &CancelToken,
    ) -> Vec<Result<BacktestResult, CfTraderError>> {
        requests
            .par_iter()
            .map(|request| {
                self.run_with(request, cancel).inspect_err(|e| {
                    warn!(
                        instrument_id = request.instrument_id,
                        strategy = %request.strategy_name,
                        error = %e,
                        "backtest failed"
                    )
                })
            })
            .collect()
    }
}
