//! Capital Flow (CF) momentum oscillator with a volatility-adaptive window.
//!
//! For each bar `t >= total_klines`:
//!
//! 1. Over the base window `[t - total_klines + 1, t]` measure the relative
//!    amplitude `a = (max_high - min_low) / min_low`, floored at `epsilon`.
//! 2. Resize the lookback: `floor(total_klines * custom_amplitude / a)`,
//!    clamped into `[new_total_klines_min, new_total_klines_max]`. High
//!    volatility shrinks the window, low volatility grows it.
//! 3. Split the resized window into two halves and average the percent
//!    change of the highs and of the lows between them.
//!
//! SecondCF re-applies step 3 forward from an anchor (entry) index over a
//! window sized from the MainCF value at that anchor.

use crate::domain::candle::{CandleSeries, Window};
use crate::domain::position::Side;
use crate::domain::strategy::StrategyConfig;

/// Windows shorter than this cannot be split meaningfully.
const MIN_SPLIT_LEN: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapitalFlowSeries {
    pub main_cf: Vec<f64>,
    pub window_main: Vec<usize>,
    pub second_cf: Vec<f64>,
    pub window_second: Vec<usize>,
}

/// CF calculator. Holds only immutable parameters copied out of a
/// [`StrategyConfig`]; every run builds its own.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalFlow {
    total_klines: usize,
    custom_amplitude: f64,
    epsilon: f64,
    second_cf_env: f64,
    new_total_klines_min: usize,
    new_total_klines_max: usize,
    second_total_klines_min: usize,
}

impl CapitalFlow {
    pub fn new(config: &StrategyConfig) -> Self {
        CapitalFlow {
            total_klines: config.total_klines,
            custom_amplitude: config.custom_amplitude,
            epsilon: config.epsilon,
            second_cf_env: config.second_cf_env,
            new_total_klines_min: config.new_total_klines_min,
            new_total_klines_max: config.new_total_klines_max,
            second_total_klines_min: config.second_total_klines_min,
        }
    }

    fn clamp_window(&self, value: usize) -> usize {
        value
            .max(self.new_total_klines_min)
            .min(self.new_total_klines_max)
    }

    /// Adaptive window length at bar `t`.
    pub fn new_total_klines(&self, series: &CandleSeries, t: usize) -> usize {
        let Some(window) = series.trailing_window(t, self.total_klines) else {
            return self.clamp_window(self.total_klines);
        };

        let high_window = window.max_high();
        let low_window = window.min_low();
        if low_window == 0.0 {
            return self.clamp_window(self.total_klines);
        }

        let a_current = (high_window - low_window) / low_window;
        let a_safe = a_current.max(self.epsilon);
        let raw = (self.total_klines as f64 * self.custom_amplitude / a_safe).floor();

        // `as` saturates: negative and NaN become 0, overflow becomes usize::MAX
        self.clamp_window(raw as usize)
    }

    /// MainCF at bar `t` and the window length it was measured over.
    ///
    /// Returns `prev_cf` when the adaptive window is too short to split or
    /// would reach before the first candle.
    pub fn main_cf(&self, series: &CandleSeries, t: usize, prev_cf: f64) -> (f64, usize) {
        if t < self.total_klines {
            return (0.0, self.total_klines);
        }

        let new_total_klines = self.new_total_klines(series, t);
        let cf = match series.trailing_window(t, new_total_klines) {
            Some(window) => half_split_cf(window, prev_cf),
            None => prev_cf,
        };
        (cf, new_total_klines)
    }

    /// Window length for SecondCF measured from an entry with MainCF `main_cf_entry`.
    pub fn second_total_klines(&self, main_cf_entry: f64, prev_second_total_klines: usize) -> usize {
        if main_cf_entry == 0.0 || self.second_cf_env == 0.0 {
            return self.second_total_klines_min;
        }

        let divisor = main_cf_entry * self.second_cf_env;
        if divisor == 0.0 {
            // product underflowed
            return prev_second_total_klines;
        }

        let raw = (prev_second_total_klines as f64 / divisor.abs()).floor() as usize;
        raw.max(self.second_total_klines_min)
    }

    /// SecondCF over `[entry_idx, entry_idx + second_total_klines)`, using only
    /// the first `visible` candles. Yields 0 when the window does not fit.
    pub fn second_cf(
        &self,
        series: &CandleSeries,
        entry_idx: usize,
        main_cf_entry: f64,
        prev_second_total_klines: usize,
        visible: usize,
    ) -> (f64, usize) {
        let second_total_klines =
            self.second_total_klines(main_cf_entry, prev_second_total_klines);
        let visible = visible.min(series.len());

        let end = entry_idx.saturating_add(second_total_klines);
        if end >= visible {
            return (0.0, second_total_klines);
        }

        let cf = series
            .window(entry_idx, end)
            .map(|w| half_split_cf(w, 0.0))
            .unwrap_or(0.0);
        (cf, second_total_klines)
    }

    /// Full MainCF / SecondCF series. Every value at index `t` is computed
    /// from candles `0..=t` only.
    ///
    /// SecondCF is anchored at the most recent MainCF zero crossing.
    pub fn calculate(&self, series: &CandleSeries) -> CapitalFlowSeries {
        let n = series.len();
        let mut out = CapitalFlowSeries {
            main_cf: vec![0.0; n],
            window_main: vec![self.total_klines; n],
            second_cf: vec![0.0; n],
            window_second: vec![self.second_total_klines_min; n],
        };

        let mut anchor: Option<usize> = None;
        for t in 1..n {
            let (cf, window) = self.main_cf(series, t, out.main_cf[t - 1]);
            out.main_cf[t] = cf;
            out.window_main[t] = window;

            if zero_cross(out.main_cf[t - 1], cf).is_some() {
                anchor = Some(t);
            }

            if let Some(e) = anchor {
                let (second, second_window) =
                    self.second_cf(series, e, out.main_cf[e], out.window_main[e], t + 1);
                out.second_cf[t] = second;
                out.window_second[t] = second_window;
            }
        }

        out
    }
}

/// Direction of a strict zero crossing between two consecutive CF values.
pub fn zero_cross(prev: f64, current: f64) -> Option<Side> {
    if prev <= 0.0 && current > 0.0 {
        Some(Side::Long)
    } else if prev >= 0.0 && current < 0.0 {
        Some(Side::Short)
    } else {
        None
    }
}

/// Average percent change of highs and of lows between the two halves.
fn half_split_cf(window: Window<'_>, prev_cf: f64) -> f64 {
    if window.len() < MIN_SPLIT_LEN {
        return prev_cf;
    }

    let (first, second) = window.split_half();
    let (h1, l1) = (first.max_high(), first.min_low());
    let (h2, l2) = (second.max_high(), second.min_low());

    let h_cf = if h1 != 0.0 { (h2 - h1) / h1 * 100.0 } else { 0.0 };
    let l_cf = if l1 != 0.0 { (l2 - l1) / l1 * 100.0 } else { 0.0 };

    (h_cf + l_cf) / 2.0
}
