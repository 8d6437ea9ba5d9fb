//! Port traits: the seams between the backtest core and its storage.

pub mod candle_port;
pub mod config_port;
pub mod result_port;
pub mod strategy_port;
