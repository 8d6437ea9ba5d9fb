//! Candle storage port.

use crate::domain::candle::CandleSeries;
use crate::domain::error::CfTraderError;
use chrono::NaiveDateTime;

pub trait CandlePort: Send + Sync {
    /// Candles for `instrument_id` with `start <= timestamp <= end`, in
    /// ascending timestamp order. An empty series is not an error here.
    fn fetch_candles(
        &self,
        instrument_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<CandleSeries, CfTraderError>;
}
