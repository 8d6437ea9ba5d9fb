//! CSV candle files: one `<instrument_id>.csv` per instrument.
//!
//! Rows are `timestamp_ms,open,high,low,close,volume[,...]` without a header.
//! Extra columns are ignored; rows that do not parse are skipped.

use crate::domain::candle::{Candle, CandleSeries, from_millis, to_millis};
use crate::domain::error::CfTraderError;
use crate::ports::candle_port::CandlePort;
use chrono::NaiveDateTime;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument_id: i64) -> PathBuf {
        self.base_path.join(format!("{instrument_id}.csv"))
    }

    /// All stored candles for an instrument; a missing file reads as empty.
    pub fn load_all(&self, instrument_id: i64) -> Result<Vec<Candle>, CfTraderError> {
        let path = self.csv_path(instrument_id);
        match fs::File::open(&path) {
            Ok(file) => parse_candles(file, &path.display().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CfTraderError::Storage {
                reason: format!("failed to read {}: {}", path.display(), e),
            }),
        }
    }

    /// Merges `candles` into the instrument's file. Existing timestamps are
    /// kept, matching the conflict rule of the SQLite store. Returns the
    /// number of new candles.
    pub fn import(&self, instrument_id: i64, candles: &[Candle]) -> Result<usize, CfTraderError> {
        let existing = self.load_all(instrument_id)?;
        let before = existing.len();

        let mut merged = candles.to_vec();
        merged.extend(existing);
        let series = CandleSeries::from_unsorted(merged);
        let added = series.len() - before;

        fs::create_dir_all(&self.base_path).map_err(|e| CfTraderError::Storage {
            reason: format!("failed to create {}: {}", self.base_path.display(), e),
        })?;
        let path = self.csv_path(instrument_id);
        write_candles(&path, series.as_slice())?;

        info!(instrument_id, added, path = %path.display(), "imported candles");
        Ok(added)
    }
}

impl CandlePort for CsvAdapter {
    fn fetch_candles(
        &self,
        instrument_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<CandleSeries, CfTraderError> {
        let in_range: Vec<Candle> = self
            .load_all(instrument_id)?
            .into_iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .collect();
        Ok(CandleSeries::from_unsorted(in_range))
    }
}

/// Parses candle rows from any reader. `source` only labels log output.
pub fn parse_candles<R: Read>(reader: R, source: &str) -> Result<Vec<Candle>, CfTraderError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut candles = Vec::new();
    let mut skipped = 0usize;
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| CfTraderError::Storage {
            reason: format!("CSV read error in {source}: {e}"),
        })?;

        let first = record.get(0).unwrap_or("");
        if first.is_empty() || first == "-" {
            continue;
        }

        match parse_record(&record) {
            Some(candle) => candles.push(candle),
            None => {
                skipped += 1;
                warn!(source, line = line + 1, "skipping unparseable candle row");
            }
        }
    }

    if skipped > 0 {
        warn!(source, skipped, kept = candles.len(), "some candle rows were skipped");
    }
    Ok(candles)
}

fn parse_record(record: &csv::StringRecord) -> Option<Candle> {
    let field = |i: usize| -> Option<f64> { record.get(i)?.parse().ok() };

    let millis: i64 = record.get(0)?.parse().ok()?;
    Some(Candle {
        timestamp: from_millis(millis)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

fn write_candles(path: &Path, candles: &[Candle]) -> Result<(), CfTraderError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| CfTraderError::Storage {
            reason: format!("failed to open {} for writing: {}", path.display(), e),
        })?;

    for c in candles {
        wtr.write_record(&[
            to_millis(c.timestamp).to_string(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])
        .map_err(|e| CfTraderError::Storage {
            reason: format!("CSV write error: {e}"),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
