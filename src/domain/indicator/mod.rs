//! Technical indicators.
//!
//! All indicators are pure functions of a [`CandleSeries`] and return vectors
//! aligned index-for-index with it. [`IndicatorSet::compute`] builds every
//! series a backtest needs from an immutable [`StrategyConfig`].

pub mod adx;
pub mod atr;
pub mod capital_flow;

use crate::domain::candle::CandleSeries;
use crate::domain::strategy::StrategyConfig;

use adx::calculate_adx;
use atr::{atr_percent, calculate_atr};
use capital_flow::CapitalFlow;

/// EMA with k = 2/(n+1), seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = first;
    out.push(prev);
    for &v in &values[1..] {
        prev = k * v + (1.0 - k) * prev;
        out.push(prev);
    }
    out
}

/// Parallel indicator arrays, each the length of the candle series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    pub main_cf: Vec<f64>,
    pub second_cf: Vec<f64>,
    pub window_main: Vec<usize>,
    pub window_second: Vec<usize>,
    pub atr: Vec<f64>,
    pub atr_long: Vec<f64>,
    pub atr_percent: Vec<f64>,
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

impl IndicatorSet {
    pub fn compute(config: &StrategyConfig, series: &CandleSeries) -> Self {
        let cf = CapitalFlow::new(config).calculate(series);
        let atr = calculate_atr(series, config.atr_short_period);
        let atr_long = calculate_atr(series, config.atr_long_period);
        let atr_percent = atr_percent(series, &atr);
        let dm = calculate_adx(series, config.adx_period);

        IndicatorSet {
            main_cf: cf.main_cf,
            second_cf: cf.second_cf,
            window_main: cf.window_main,
            window_second: cf.window_second,
            atr,
            atr_long,
            atr_percent,
            adx: dm.adx,
            plus_di: dm.plus_di,
            minus_di: dm.minus_di,
        }
    }

    pub fn len(&self) -> usize {
        self.main_cf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main_cf.is_empty()
    }
}
