//! Backtest result persistence port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CfTraderError;

pub trait ResultPort: Send + Sync {
    /// Stores a complete result and returns its assigned id.
    fn persist_result(&self, result: &BacktestResult) -> Result<i64, CfTraderError>;
}
