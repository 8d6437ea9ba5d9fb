//! Entry signal evaluation.
//!
//! LONG when MainCF crosses from <= 0 to > 0 with ADX above the threshold and
//! +DI above -DI; SHORT is the mirror image.

use super::indicator::IndicatorSet;
use super::indicator::capital_flow::zero_cross;
use super::position::Side;

/// Outcome of evaluating one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Enter(Side),
    /// Fewer than two prior bars.
    Warmup,
    /// No MainCF zero crossing.
    NoCross,
    /// Crossing present but ADX at or below the threshold.
    WeakTrend,
    /// Crossing and trend present but the DI lines disagree with the direction.
    DirectionMismatch,
}

pub fn evaluate(idx: usize, indicators: &IndicatorSet, adx_threshold: f64) -> Evaluation {
    if idx < 2 || idx >= indicators.len() {
        return Evaluation::Warmup;
    }

    let Some(side) = zero_cross(indicators.main_cf[idx - 1], indicators.main_cf[idx]) else {
        return Evaluation::NoCross;
    };

    if indicators.adx[idx] <= adx_threshold {
        return Evaluation::WeakTrend;
    }

    let (plus, minus) = (indicators.plus_di[idx], indicators.minus_di[idx]);
    let aligned = match side {
        Side::Long => plus > minus,
        Side::Short => minus > plus,
    };
    if !aligned {
        return Evaluation::DirectionMismatch;
    }

    Evaluation::Enter(side)
}
