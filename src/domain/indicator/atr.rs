//! Average True Range.
//!
//! TR[0] = high - low, TR[i] = max(H-L, |H-PC|, |L-PC|).
//! ATR is the EMA of TR with k = 2/(n+1), seeded with TR[0].

use super::ema;
use crate::domain::candle::CandleSeries;

pub fn true_range(series: &CandleSeries) -> Vec<f64> {
    series
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(series[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(series: &CandleSeries, period: usize) -> Vec<f64> {
    if series.len() < 2 {
        return vec![0.0; series.len()];
    }
    ema(&true_range(series), period)
}

/// ATR as a percentage of the close; zero where the close is zero.
pub fn atr_percent(series: &CandleSeries, atr: &[f64]) -> Vec<f64> {
    series
        .iter()
        .zip(atr)
        .map(|(c, &a)| if c.close != 0.0 { a / c.close * 100.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_series(hlc: &[(f64, f64, f64)]) -> CandleSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        CandleSeries::new(
            hlc.iter()
                .enumerate()
                .map(|(i, &(high, low, close))| Candle {
                    timestamp: start + chrono::Duration::hours(i as i64),
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

    #[test]
    fn atr_worked_example() {
        let series = make_series(&[(10.0, 8.0, 9.0), (11.0, 9.0, 10.0), (9.0, 7.0, 8.0)]);

        assert_eq!(true_range(&series), vec![2.0, 2.0, 3.0]);

        let atr = calculate_atr(&series, 2);
        assert_relative_eq!(atr[0], 2.0);
        assert_relative_eq!(atr[1], 2.0);
        assert_relative_eq!(atr[2], (2.0 / 3.0) * 3.0 + (1.0 / 3.0) * 2.0, epsilon = 1e-12);
        assert!((atr[2] - 2.667).abs() < 1e-3);
    }

    #[test]
    fn atr_single_candle_is_zero_filled() {
        let series = make_series(&[(10.0, 8.0, 9.0)]);
        assert_eq!(calculate_atr(&series, 14), vec![0.0]);
    }

    #[test]
    fn atr_empty_series() {
        let series = CandleSeries::default();
        assert!(calculate_atr(&series, 14).is_empty());
    }

    #[test]
    fn atr_handles_gaps() {
        // gap up: |130 - 105| = 25 dominates H-L = 10
        let series = make_series(&[(110.0, 100.0, 105.0), (130.0, 120.0, 125.0)]);
        let tr = true_range(&series);
        assert_relative_eq!(tr[1], 25.0);
    }

    #[test]
    fn atr_percent_of_close() {
        let series = make_series(&[(10.0, 8.0, 10.0), (11.0, 9.0, 0.0)]);
        let pct = atr_percent(&series, &[2.0, 2.0]);
        assert_relative_eq!(pct[0], 20.0);
        assert_eq!(pct[1], 0.0);
    }
}
