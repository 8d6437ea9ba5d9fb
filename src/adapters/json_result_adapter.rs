//! Result persistence as pretty-printed JSON files.
//!
//! Each persisted result is written to `<results_dir>/result_<id>.json`. Ids
//! continue from the highest one already present in the directory.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::CfTraderError;
use crate::ports::result_port::ResultPort;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

pub struct JsonResultAdapter {
    dir: PathBuf,
    next_id: AtomicI64,
}

impl JsonResultAdapter {
    pub fn new(dir: PathBuf) -> Result<Self, CfTraderError> {
        fs::create_dir_all(&dir).map_err(|e| CfTraderError::Storage {
            reason: format!("failed to create {}: {}", dir.display(), e),
        })?;

        let mut last_id = 0i64;
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let id = name
                .to_string_lossy()
                .strip_prefix("result_")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|n| n.parse::<i64>().ok());
            if let Some(id) = id {
                last_id = last_id.max(id);
            }
        }

        Ok(Self {
            dir,
            next_id: AtomicI64::new(last_id + 1),
        })
    }

    pub fn path_for(&self, id: i64) -> PathBuf {
        self.dir.join(format!("result_{id}.json"))
    }
}

/// Writes one result to `path`, replacing any existing file.
pub fn write_result_json(path: &Path, result: &BacktestResult) -> Result<(), CfTraderError> {
    let json = serde_json::to_string_pretty(result).map_err(|e| CfTraderError::Storage {
        reason: format!("failed to encode result: {e}"),
    })?;
    fs::write(path, json).map_err(|e| CfTraderError::Storage {
        reason: format!("failed to write {}: {}", path.display(), e),
    })
}

pub fn read_result_json(path: &Path) -> Result<BacktestResult, CfTraderError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CfTraderError::Storage {
        reason: format!("failed to decode {}: {}", path.display(), e),
    })
}

impl ResultPort for JsonResultAdapter {
    fn persist_result(&self, result: &BacktestResult) -> Result<i64, CfTraderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = BacktestResult {
            id: Some(id),
            ..result.clone()
        };
        let path = self.path_for(id);
        write_result_json(&path, &stored)?;
        info!(id, path = %path.display(), "wrote result");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample() -> BacktestResult {
        let t = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        BacktestResult {
            id: None,
            instrument_id: 4,
            strategy_id: 1,
            strategy_name: "cf".to_string(),
            start_time: t,
            end_time: t + chrono::Duration::days(30),
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            total_return: 0.0,
            initial_balance: 10_000.0,
            final_balance: 10_000.0,
            metrics: BTreeMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            debug_trace: Vec::new(),
        }
    }

    #[test]
    fn assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let adapter = JsonResultAdapter::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(adapter.persist_result(&sample()).unwrap(), 1);
        assert_eq!(adapter.persist_result(&sample()).unwrap(), 2);
        assert!(adapter.path_for(2).exists());
    }

    #[test]
    fn continues_after_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("result_7.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let adapter = JsonResultAdapter::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(adapter.persist_result(&sample()).unwrap(), 8);
    }

    #[test]
    fn written_file_reads_back() {
        let dir = TempDir::new().unwrap();
        let adapter = JsonResultAdapter::new(dir.path().to_path_buf()).unwrap();
        let id = adapter.persist_result(&sample()).unwrap();
        let loaded = read_result_json(&adapter.path_for(id)).unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.instrument_id, 4);
    }
}
