//! Candle representation, ordered candle series and bounds-checked windows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::CfTraderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Unix epoch milliseconds, the storage representation of candle timestamps.
pub fn to_millis(timestamp: NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Candles of one instrument with strictly increasing timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Wraps an already ordered vector, rejecting duplicate or descending timestamps.
    pub fn new(candles: Vec<Candle>) -> Result<Self, CfTraderError> {
        if let Some(pos) = candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(CfTraderError::UnorderedData { index: pos + 1 });
        }
        Ok(Self { candles })
    }

    /// Sorts by timestamp and keeps the last candle seen for a repeated timestamp.
    pub fn from_unsorted(mut candles: Vec<Candle>) -> Self {
        // stable sort keeps input order among equal timestamps
        candles.sort_by_key(|c| c.timestamp);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => deduped.push(candle),
            }
        }
        Self { candles: deduped }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Half-open view `[start, end)`. `None` when the range is empty or out of bounds.
    pub fn window(&self, start: usize, end: usize) -> Option<Window<'_>> {
        if start >= end || end > self.candles.len() {
            return None;
        }
        Some(Window {
            candles: &self.candles[start..end],
            start,
        })
    }

    /// View of the `len` candles ending at `last` inclusive.
    pub fn trailing_window(&self, last: usize, len: usize) -> Option<Window<'_>> {
        let end = last.checked_add(1)?;
        let start = end.checked_sub(len)?;
        self.window(start, end)
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;

    fn index(&self, index: usize) -> &Candle {
        &self.candles[index]
    }
}

/// Read-only slice of a [`CandleSeries`] that remembers where it starts.
#[derive(Debug, Clone, Copy)]
pub struct Window<'a> {
    candles: &'a [Candle],
    start: usize,
}

impl<'a> Window<'a> {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Exclusive end index in the parent series.
    pub fn end(&self) -> usize {
        self.start + self.candles.len()
    }

    pub fn max_high(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_low(&self) -> f64 {
        self.candles
            .iter()
            .map(|c| c.low)
            .fold(f64::INFINITY, f64::min)
    }

    /// Splits at `len / 2`; the second half gets the extra candle on odd lengths.
    pub fn split_half(&self) -> (Window<'a>, Window<'a>) {
        let half = self.candles.len() / 2;
        let (left, right) = self.candles.split_at(half);
        (
            Window {
                candles: left,
                start: self.start,
            },
            Window {
                candles: right,
                start: self.start + half,
            },
        )
    }
}
