//! INI file configuration adapter.
//!
//! Also serves as the strategy store for the `files` backend: every
//! `[strategy:<name>]` section defines one strategy, with unset parameters
//! taking their defaults. Section and key names are case-insensitive.

use crate::domain::error::CfTraderError;
use crate::domain::strategy::{Strategy, StrategyConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::strategy_port::StrategyPort;
use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;

const STRATEGY_PREFIX: &str = "strategy:";

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }

    /// Names of all `[strategy:<name>]` sections, sorted.
    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sections()
            .into_iter()
            .filter_map(|s| s.strip_prefix(STRATEGY_PREFIX).map(|n| n.trim().to_string()))
            .collect();
        names.sort();
        names
    }

    fn parse_field<T: FromStr>(&self, section: &str, key: &str, default: T) -> Result<T, CfTraderError>
    where
        T::Err: std::fmt::Display,
    {
        match self.config.get(section, key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| CfTraderError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn strategy_config(&self, section: &str) -> Result<StrategyConfig, CfTraderError> {
        let d = StrategyConfig::default();
        Ok(StrategyConfig {
            initial_equity: self.parse_field(section, "initial_equity", d.initial_equity)?,
            total_klines: self.parse_field(section, "total_klines", d.total_klines)?,
            custom_amplitude: self.parse_field(section, "custom_amplitude", d.custom_amplitude)?,
            epsilon: self.parse_field(section, "epsilon", d.epsilon)?,
            second_cf_env: self.parse_field(section, "second_cf_env", d.second_cf_env)?,
            new_total_klines_min: self.parse_field(
                section,
                "new_total_klines_min",
                d.new_total_klines_min,
            )?,
            new_total_klines_max: self.parse_field(
                section,
                "new_total_klines_max",
                d.new_total_klines_max,
            )?,
            second_total_klines_min: self.parse_field(
                section,
                "second_total_klines_min",
                d.second_total_klines_min,
            )?,
            atr_short_period: self.parse_field(section, "atr_short_period", d.atr_short_period)?,
            atr_long_period: self.parse_field(section, "atr_long_period", d.atr_long_period)?,
            adx_period: self.parse_field(section, "adx_period", d.adx_period)?,
            adx_threshold: self.parse_field(section, "adx_threshold", d.adx_threshold)?,
        })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        self.config.sections()
    }
}

impl StrategyPort for FileConfigAdapter {
    fn resolve_strategy(&self, name: &str) -> Result<Strategy, CfTraderError> {
        let wanted = name.trim().to_lowercase();
        let Some(section) = self
            .sections()
            .into_iter()
            .find(|s| s.strip_prefix(STRATEGY_PREFIX).map(str::trim) == Some(wanted.as_str()))
        else {
            return Err(CfTraderError::StrategyNotFound {
                name: name.to_string(),
            });
        };

        Ok(Strategy {
            id: self.parse_field(&section, "id", 0i64)?,
            name: wanted,
            config: self.strategy_config(&section)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[storage]
backend = sqlite

[sqlite]
path = /tmp/cf.db
pool_size = 2
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("storage", "backend"),
            Some("sqlite".to_string())
        );
        assert_eq!(adapter.get_int("sqlite", "pool_size", 4), 2);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ndebug = true\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_default_for_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ndebug_max_candles = abc\n").unwrap();
        assert_eq!(adapter.get_int("backtest", "debug_max_candles", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string("[x]\nv = 0.25\nw = nope\n").unwrap();
        assert_eq!(adapter.get_double("x", "v", 0.0), 0.25);
        assert_eq!(adapter.get_double("x", "w", 9.5), 9.5);
        assert_eq!(adapter.get_double("x", "missing", 1.5), 1.5);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("backtest", "a", false));
        assert!(adapter.get_bool("backtest", "b", false));
        assert!(adapter.get_bool("backtest", "c", false));
        assert!(!adapter.get_bool("backtest", "d", true));
        assert!(!adapter.get_bool("backtest", "e", true));
        assert!(!adapter.get_bool("backtest", "f", true));
        assert!(adapter.get_bool("backtest", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[files]\ncandles_dir = /data/candles\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("files", "candles_dir"),
            Some("/data/candles".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }

    #[test]
    fn resolves_strategy_section_with_defaults() {
        let adapter = FileConfigAdapter::from_string(
            "[strategy:CF_Fast]\nid = 3\ntotal_klines = 10\nadx_threshold = 20.5\n",
        )
        .unwrap();
        let strategy = adapter.resolve_strategy("cf_fast").unwrap();
        assert_eq!(strategy.id, 3);
        assert_eq!(strategy.name, "cf_fast");
        assert_eq!(strategy.config.total_klines, 10);
        assert_eq!(strategy.config.adx_threshold, 20.5);
        assert_eq!(strategy.config.atr_short_period, 14);
        assert_eq!(strategy.config.initial_equity, 10_000.0);
    }

    #[test]
    fn strategy_lookup_is_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[strategy:trend]\nid = 1\n").unwrap();
        assert!(adapter.resolve_strategy("TREND").is_ok());
    }

    #[test]
    fn missing_strategy_is_not_found() {
        let adapter = FileConfigAdapter::from_string("[strategy:trend]\nid = 1\n").unwrap();
        let err = adapter.resolve_strategy("other").unwrap_err();
        assert!(matches!(err, CfTraderError::StrategyNotFound { name } if name == "other"));
    }

    #[test]
    fn malformed_strategy_value_is_invalid() {
        let adapter =
            FileConfigAdapter::from_string("[strategy:trend]\ntotal_klines = twenty\n").unwrap();
        let err = adapter.resolve_strategy("trend").unwrap_err();
        assert!(matches!(err, CfTraderError::ConfigInvalid { key, .. } if key == "total_klines"));
    }

    #[test]
    fn lists_strategy_names() {
        let adapter = FileConfigAdapter::from_string(
            "[storage]\nbackend = files\n[strategy:b]\nid = 2\n[strategy:a]\nid = 1\n",
        )
        .unwrap();
        assert_eq!(adapter.strategy_names(), vec!["a", "b"]);
    }
}
