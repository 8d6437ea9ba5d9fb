//! Configuration validation.
//!
//! Application settings are checked once at startup; strategy parameters are
//! checked before every run, after the strategy is resolved.

use crate::domain::error::CfTraderError;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};

pub fn validate_app_config(config: &dyn ConfigPort) -> Result<(), CfTraderError> {
    validate_storage(config)?;
    validate_debug(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &StrategyConfig) -> Result<(), CfTraderError> {
    positive_f64("initial_equity", config.initial_equity)?;
    non_zero("total_klines", config.total_klines)?;
    positive_f64("custom_amplitude", config.custom_amplitude)?;
    positive_f64("epsilon", config.epsilon)?;
    finite("second_cf_env", config.second_cf_env)?;
    non_zero("new_total_klines_min", config.new_total_klines_min)?;
    if config.new_total_klines_min > config.new_total_klines_max {
        return Err(invalid(
            "new_total_klines_max",
            format!(
                "must be at least new_total_klines_min ({})",
                config.new_total_klines_min
            ),
        ));
    }
    non_zero("second_total_klines_min", config.second_total_klines_min)?;
    non_zero("atr_short_period", config.atr_short_period)?;
    non_zero("atr_long_period", config.atr_long_period)?;
    non_zero("adx_period", config.adx_period)?;
    if !(0.0..100.0).contains(&config.adx_threshold) {
        return Err(invalid(
            "adx_threshold",
            "must be in [0, 100)".to_string(),
        ));
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD` (midnight) or `YYYY-MM-DD HH:MM:SS`.
pub fn parse_datetime(value: &str, field: &str) -> Result<NaiveDateTime, CfTraderError> {
    let value = value.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CfTraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: field.to_string(),
            reason: format!("invalid date '{value}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"),
        })
}

fn validate_storage(config: &dyn ConfigPort) -> Result<(), CfTraderError> {
    let backend = config
        .get_string("storage", "backend")
        .unwrap_or_else(|| "sqlite".to_string());

    match backend.as_str() {
        "sqlite" => {
            required(config, "sqlite", "path")?;
            if config.get_int("sqlite", "pool_size", 4) < 1 {
                return Err(CfTraderError::ConfigInvalid {
                    section: "sqlite".to_string(),
                    key: "pool_size".to_string(),
                    reason: "pool_size must be at least 1".to_string(),
                });
            }
        }
        "files" => {
            required(config, "files", "candles_dir")?;
        }
        other => {
            return Err(CfTraderError::ConfigInvalid {
                section: "storage".to_string(),
                key: "backend".to_string(),
                reason: format!("unknown backend '{other}', expected sqlite or files"),
            });
        }
    }
    Ok(())
}

fn validate_debug(config: &dyn ConfigPort) -> Result<(), CfTraderError> {
    if config.get_int("backtest", "debug_max_candles", 500) < 0 {
        return Err(CfTraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "debug_max_candles".to_string(),
            reason: "debug_max_candles must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, CfTraderError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(CfTraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(name: &str, reason: String) -> CfTraderError {
    CfTraderError::InvalidParameter {
        name: name.to_string(),
        reason,
    }
}

fn non_zero(name: &str, value: usize) -> Result<(), CfTraderError> {
    if value == 0 {
        return Err(invalid(name, "must be at least 1".to_string()));
    }
    Ok(())
}

fn positive_f64(name: &str, value: f64) -> Result<(), CfTraderError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(name, format!("must be positive, got {value}")));
    }
    Ok(())
}

fn finite(name: &str, value: f64) -> Result<(), CfTraderError> {
    if !value.is_finite() {
        return Err(invalid(name, format!("must be finite, got {value}")));
    }
    Ok(())
}
