//! Average Directional Index with +DI / -DI.
//!
//! +DM, -DM and TR are smoothed with the same EMA (k = 2/(n+1), seeded at
//! index 0). DI = 100 * sDM / sTR, DX = 100 * |+DI - -DI| / (+DI + -DI),
//! ADX = EMA(DX).

use super::atr::true_range;
use super::ema;
use crate::domain::candle::CandleSeries;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectionalMovement {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

pub fn calculate_adx(series: &CandleSeries, period: usize) -> DirectionalMovement {
    let n = series.len();
    if n < 2 {
        return DirectionalMovement {
            adx: vec![0.0; n],
            plus_di: vec![0.0; n],
            minus_di: vec![0.0; n],
        };
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up_move = series[i].high - series[i - 1].high;
        let down_move = series[i - 1].low - series[i].low;
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus = ema(&plus_dm, period);
    let smoothed_minus = ema(&minus_dm, period);
    let smoothed_tr = ema(&true_range(series), period);

    let mut plus_di = vec![0.0; n];
    let mut minus_di = vec![0.0; n];
    let mut dx = vec![0.0; n];
    for i in 0..n {
        if smoothed_tr[i] != 0.0 {
            plus_di[i] = smoothed_plus[i] / smoothed_tr[i] * 100.0;
            minus_di[i] = smoothed_minus[i] / smoothed_tr[i] * 100.0;
        }
        let di_sum = plus_di[i] + minus_di[i];
        if di_sum != 0.0 {
            dx[i] = (plus_di[i] - minus_di[i]).abs() / di_sum * 100.0;
        }
    }

    DirectionalMovement {
        adx: ema(&dx, period),
        plus_di,
        minus_di,
    }
}
