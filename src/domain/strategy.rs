//! Strategy configuration.
//!
//! A [`StrategyConfig`] is loaded once per run and never mutated; indicator
//! calculators are built from it by value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub initial_equity: f64,

    // Capital Flow
    pub total_klines: usize,
    pub custom_amplitude: f64,
    pub epsilon: f64,
    pub second_cf_env: f64,

    // Window bounds
    pub new_total_klines_min: usize,
    pub new_total_klines_max: usize,
    pub second_total_klines_min: usize,

    // ATR / ADX
    pub atr_short_period: usize,
    pub atr_long_period: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            initial_equity: 10_000.0,
            total_klines: 20,
            custom_amplitude: 0.05,
            epsilon: 0.0001,
            second_cf_env: 1.0,
            new_total_klines_min: 5,
            new_total_klines_max: 100,
            second_total_klines_min: 5,
            atr_short_period: 14,
            atr_long_period: 50,
            adx_period: 14,
            adx_threshold: 25.0,
        }
    }
}

impl StrategyConfig {
    /// Fewest candles a run needs: one bar past the base window, and never fewer
    /// than the three bars a zero-crossing signal looks at.
    pub fn min_candles(&self) -> usize {
        self.total_klines.saturating_add(1).max(3)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    pub config: StrategyConfig,
}
