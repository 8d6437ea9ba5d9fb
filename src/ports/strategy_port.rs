//! Strategy lookup port.

use crate::domain::error::CfTraderError;
use crate::domain::strategy::Strategy;

pub trait StrategyPort: Send + Sync {
    /// Fails with `StrategyNotFound` when no strategy has this name.
    fn resolve_strategy(&self, name: &str) -> Result<Strategy, CfTraderError>;
}
