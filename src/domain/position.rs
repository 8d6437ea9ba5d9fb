//! Open position and closed trade records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl std::str::FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "take_profit" => Ok(ExitReason::TakeProfit),
            "end_of_data" => Ok(ExitReason::EndOfData),
            other => Err(format!("unknown exit reason: {other}")),
        }
    }
}

/// An open position. Levels and size are fixed when it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_index: usize,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

impl Position {
    /// Opens at `close`; stop at 2 ATR against the trade, target at 3 ATR with it.
    pub fn open(side: Side, candle: &Candle, index: usize, atr: f64, size: f64) -> Self {
        let entry_price = candle.close;
        let (stop_loss, take_profit) = match side {
            Side::Long => (entry_price - 2.0 * atr, entry_price + 3.0 * atr),
            Side::Short => (entry_price + 2.0 * atr, entry_price - 3.0 * atr),
        };
        Position {
            side,
            entry_price,
            entry_time: candle.timestamp,
            entry_index: index,
            size,
            stop_loss,
            take_profit,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn should_stop_loss(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.low <= self.stop_loss,
            Side::Short => candle.high >= self.stop_loss,
        }
    }

    pub fn should_take_profit(&self, candle: &Candle) -> bool {
        match self.side {
            Side::Long => candle.high >= self.take_profit,
            Side::Short => candle.low <= self.take_profit,
        }
    }

    /// Level touched by the candle's range, stop-loss first.
    pub fn triggered_exit(&self, candle: &Candle) -> Option<(f64, ExitReason)> {
        if self.should_stop_loss(candle) {
            Some((self.stop_loss, ExitReason::StopLoss))
        } else if self.should_take_profit(candle) {
            Some((self.take_profit, ExitReason::TakeProfit))
        } else {
            None
        }
    }

    /// Cash moved when the position is settled at `price`. Both sides settle
    /// at `size * price`; the side only affects the reported P&L.
    pub fn settlement_value(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn realized_pnl(&self, exit_price: f64) -> f64 {
        let raw = (exit_price - self.entry_price) * self.size;
        match self.side {
            Side::Long => raw,
            Side::Short => -raw,
        }
    }

    pub fn close(self, exit_price: f64, exit_time: NaiveDateTime, exit_reason: ExitReason) -> Trade {
        Trade {
            side: self.side,
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            exit_price,
            exit_time,
            size: self.size,
            pnl: self.realized_pnl(exit_price),
            exit_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_time: NaiveDateTime,
    pub size: f64,
    pub pnl: f64,
    pub exit_reason: ExitReason,
}
