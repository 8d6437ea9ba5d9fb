//! Domain error types.

/// Top-level error type for cftrader.
#[derive(Debug, thiserror::Error)]
pub enum CfTraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("strategy not found: {name}")]
    StrategyNotFound { name: String },

    #[error("invalid strategy parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("no candles for instrument {instrument_id} in the requested range")]
    NoData { instrument_id: i64 },

    #[error("insufficient data for instrument {instrument_id}: have {bars} candles, need {minimum}")]
    InsufficientData {
        instrument_id: i64,
        bars: usize,
        minimum: usize,
    },

    #[error("candles out of order at index {index}: timestamps must be strictly increasing")]
    UnorderedData { index: usize },

    #[error("invalid time range: start {start} is not before end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error("storage query error: {reason}")]
    StorageQuery { reason: String },

    #[error("backtest cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CfTraderError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CfTraderError::ConfigParse { .. }
                | CfTraderError::ConfigMissing { .. }
                | CfTraderError::ConfigInvalid { .. }
                | CfTraderError::StrategyNotFound { .. }
                | CfTraderError::InvalidParameter { .. }
        )
    }

    pub fn is_data(&self) -> bool {
        matches!(
            self,
            CfTraderError::NoData { .. }
                | CfTraderError::InsufficientData { .. }
                | CfTraderError::UnorderedData { .. }
                | CfTraderError::InvalidTimeRange { .. }
        )
    }

    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            CfTraderError::Storage { .. } | CfTraderError::StorageQuery { .. }
        )
    }
}

impl From<&CfTraderError> for std::process::ExitCode {
    fn from(err: &CfTraderError) -> Self {
        let code: u8 = match err {
            CfTraderError::Io(_) => 1,
            CfTraderError::ConfigParse { .. }
            | CfTraderError::ConfigMissing { .. }
            | CfTraderError::ConfigInvalid { .. }
            | CfTraderError::StrategyNotFound { .. }
            | CfTraderError::InvalidParameter { .. } => 2,
            CfTraderError::Storage { .. } | CfTraderError::StorageQuery { .. } => 3,
            CfTraderError::NoData { .. }
            | CfTraderError::InsufficientData { .. }
            | CfTraderError::UnorderedData { .. }
            | CfTraderError::InvalidTimeRange { .. } => 5,
            CfTraderError::Cancelled => 6,
        };
        std::process::ExitCode::from(code)
    }
}
