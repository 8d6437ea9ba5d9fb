#![allow(dead_code)]

use cftrader::domain::backtest::BacktestResult;
use cftrader::domain::candle::{Candle, CandleSeries};
use cftrader::domain::error::CfTraderError;
use cftrader::domain::strategy::{Strategy, StrategyConfig};
use cftrader::ports::candle_port::CandlePort;
use cftrader::ports::result_port::ResultPort;
use cftrader::ports::strategy_port::StrategyPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockCandlePort {
    pub data: HashMap<i64, Vec<Candle>>,
    pub errors: HashMap<i64, String>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, instrument_id: i64, candles: Vec<Candle>) -> Self {
        self.data.insert(instrument_id, candles);
        self
    }

    pub fn with_error(mut self, instrument_id: i64, reason: &str) -> Self {
        self.errors.insert(instrument_id, reason.to_string());
        self
    }
}

impl CandlePort for MockCandlePort {
    fn fetch_candles(
        &self,
        instrument_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<CandleSeries, CfTraderError> {
        if let Some(reason) = self.errors.get(&instrument_id) {
            return Err(CfTraderError::StorageQuery {
                reason: reason.clone(),
            });
        }
        let candles = self
            .data
            .get(&instrument_id)
            .map(|all| {
                all.iter()
                    .filter(|c| c.timestamp >= start && c.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        CandleSeries::new(candles)
    }
}

pub struct MockStrategyPort {
    pub strategies: HashMap<String, Strategy>,
}

impl MockStrategyPort {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.insert(strategy.name.clone(), strategy);
        self
    }
}

impl StrategyPort for MockStrategyPort {
    fn resolve_strategy(&self, name: &str) -> Result<Strategy, CfTraderError> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| CfTraderError::StrategyNotFound {
                name: name.to_string(),
            })
    }
}

/// Result port that keeps everything in memory, or fails every write.
#[derive(Default)]
pub struct RecordingResultPort {
    pub saved: Mutex<Vec<BacktestResult>>,
    pub fail_with: Option<String>,
}

impl RecordingResultPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail_with: Some(reason.to_string()),
        }
    }

    pub fn count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl ResultPort for RecordingResultPort {
    fn persist_result(&self, result: &BacktestResult) -> Result<i64, CfTraderError> {
        if let Some(reason) = &self.fail_with {
            return Err(CfTraderError::Storage {
                reason: reason.clone(),
            });
        }
        let mut saved = self.saved.lock().unwrap();
        saved.push(result.clone());
        Ok(saved.len() as i64)
    }
}

pub fn ts(hour: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::hours(hour as i64)
}

/// Candle at hour `i` with a two-point range around `close`.
pub fn make_candle(i: usize, close: f64) -> Candle {
    Candle {
        timestamp: ts(i),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

pub fn from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_candle(i, c))
        .collect()
}

/// 15 bars rising by 2 from 80, then 15 bars falling by 3.
///
/// With `total_klines = 10` MainCF first leaves zero at bar 10 with a strong
/// uptrend: a LONG at close 100 that reaches its 3 ATR target on bar 14.
pub fn rise_then_fall() -> Vec<Candle> {
    let closes: Vec<f64> = (0..15)
        .map(|i| 80.0 + 2.0 * i as f64)
        .chain((1..16).map(|i| 108.0 - 3.0 * i as f64))
        .collect();
    from_closes(&closes)
}

/// Mirror image of [`rise_then_fall`]: a SHORT at close 100 on bar 10.
pub fn fall_then_rise() -> Vec<Candle> {
    let closes: Vec<f64> = (0..15)
        .map(|i| 120.0 - 2.0 * i as f64)
        .chain((1..16).map(|i| 92.0 + 3.0 * i as f64))
        .collect();
    from_closes(&closes)
}

/// Constant prices; MainCF never leaves zero.
pub fn flat(n: usize) -> Vec<Candle> {
    from_closes(&vec![100.0; n])
}

pub fn cf_strategy(name: &str, total_klines: usize) -> Strategy {
    Strategy {
        id: 1,
        name: name.to_string(),
        config: StrategyConfig {
            total_klines,
            ..StrategyConfig::default()
        },
    }
}
