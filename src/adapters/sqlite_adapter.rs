//! SQLite storage adapter: candles, strategies and backtest results.
//!
//! Timestamps are stored as Unix epoch milliseconds. Strategy parameters and
//! result metrics are stored as JSON text.

use crate::domain::backtest::BacktestResult;
use crate::domain::candle::{Candle, CandleSeries, from_millis, to_millis};
use crate::domain::error::CfTraderError;
use crate::domain::position::Trade;
use crate::domain::strategy::{Strategy, StrategyConfig};
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_port::ResultPort;
use crate::ports::strategy_port::StrategyPort;
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn datetime_column(millis: i64) -> rusqlite::Result<NaiveDateTime> {
    from_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn text_column<T: std::str::FromStr<Err = String>>(value: String) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

fn query_err(e: rusqlite::Error) -> CfTraderError {
    CfTraderError::StorageQuery {
        reason: e.to_string(),
    }
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, CfTraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| CfTraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| CfTraderError::Storage {
                    reason: e.to_string(),
                })?;

        info!(path = %db_path, pool_size, "opened sqlite store");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, CfTraderError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| CfTraderError::Storage {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, CfTraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| CfTraderError::Storage {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), CfTraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS candles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                UNIQUE (instrument_id, timestamp)
            );
            CREATE INDEX IF NOT EXISTS idx_candles_instrument_timestamp
                ON candles(instrument_id, timestamp);

            CREATE TABLE IF NOT EXISTS strategies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                config TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backtest_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument_id INTEGER NOT NULL,
                strategy_id INTEGER NOT NULL,
                strategy_name TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                total_trades INTEGER NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                total_pnl REAL NOT NULL,
                total_return REAL NOT NULL,
                initial_balance REAL NOT NULL,
                final_balance REAL NOT NULL,
                metrics TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                backtest_id INTEGER NOT NULL REFERENCES backtest_results(id) ON DELETE CASCADE,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                entry_time INTEGER NOT NULL,
                exit_price REAL NOT NULL,
                exit_time INTEGER NOT NULL,
                size REAL NOT NULL,
                pnl REAL NOT NULL,
                exit_reason TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_backtest ON trades(backtest_id);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    /// Inserts candles, leaving rows with an existing timestamp untouched.
    /// Returns the number of rows actually inserted.
    pub fn insert_candles(&self, instrument_id: i64, candles: &[Candle]) -> Result<usize, CfTraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO candles
                        (instrument_id, timestamp, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for c in candles {
                inserted += stmt
                    .execute(params![
                        instrument_id,
                        to_millis(c.timestamp),
                        c.open,
                        c.high,
                        c.low,
                        c.close,
                        c.volume
                    ])
                    .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        info!(instrument_id, inserted, offered = candles.len(), "stored candles");
        Ok(inserted)
    }

    /// Inserts a strategy or replaces the parameters of an existing one with
    /// the same name. Returns its id.
    pub fn upsert_strategy(&self, name: &str, config: &StrategyConfig) -> Result<i64, CfTraderError> {
        let json = serde_json::to_string(config).map_err(|e| CfTraderError::Storage {
            reason: format!("failed to encode strategy config: {e}"),
        })?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO strategies (name, config) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET config = excluded.config",
            params![name, json],
        )
        .map_err(query_err)?;

        conn.query_row(
            "SELECT id FROM strategies WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(query_err)
    }

    /// Loads a stored result with its trades. The equity curve and debug
    /// trace are not persisted and come back empty.
    pub fn load_result(&self, id: i64) -> Result<Option<BacktestResult>, CfTraderError> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT instrument_id, strategy_id, strategy_name, start_time, end_time,
                        total_trades, winning_trades, losing_trades, win_rate, total_pnl,
                        total_return, initial_balance, final_balance, metrics
                 FROM backtest_results WHERE id = ?1",
                params![id],
                |row| {
                    let metrics: String = row.get(13)?;
                    Ok((
                        BacktestResult {
                            id: Some(id),
                            instrument_id: row.get(0)?,
                            strategy_id: row.get(1)?,
                            strategy_name: row.get(2)?,
                            start_time: datetime_column(row.get(3)?)?,
                            end_time: datetime_column(row.get(4)?)?,
                            total_trades: row.get::<_, i64>(5)? as usize,
                            winning_trades: row.get::<_, i64>(6)? as usize,
                            losing_trades: row.get::<_, i64>(7)? as usize,
                            win_rate: row.get(8)?,
                            total_pnl: row.get(9)?,
                            total_return: row.get(10)?,
                            initial_balance: row.get(11)?,
                            final_balance: row.get(12)?,
                            metrics: BTreeMap::new(),
                            trades: Vec::new(),
                            equity_curve: Vec::new(),
                            debug_trace: Vec::new(),
                        },
                        metrics,
                    ))
                },
            )
            .optional()
            .map_err(query_err)?;

        let Some((mut result, metrics)) = row else {
            return Ok(None);
        };
        result.metrics = serde_json::from_str(&metrics).map_err(|e| CfTraderError::Storage {
            reason: format!("failed to decode metrics of result {id}: {e}"),
        })?;
        result.trades = self.load_trades(id)?;
        Ok(Some(result))
    }

    pub fn load_trades(&self, backtest_id: i64) -> Result<Vec<Trade>, CfTraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT side, entry_price, entry_time, exit_price, exit_time, size, pnl, exit_reason
                 FROM trades WHERE backtest_id = ?1 ORDER BY id ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![backtest_id], |row| {
                Ok(Trade {
                    side: text_column(row.get(0)?)?,
                    entry_price: row.get(1)?,
                    entry_time: datetime_column(row.get(2)?)?,
                    exit_price: row.get(3)?,
                    exit_time: datetime_column(row.get(4)?)?,
                    size: row.get(5)?,
                    pnl: row.get(6)?,
                    exit_reason: text_column(row.get(7)?)?,
                })
            })
            .map_err(query_err)?;

        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(query_err)?);
        }
        Ok(trades)
    }
}

impl CandlePort for SqliteAdapter {
    fn fetch_candles(
        &self,
        instrument_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<CandleSeries, CfTraderError> {
        let conn = self.conn()?;

        let query = "SELECT timestamp, open, high, low, close, volume
                     FROM candles
                     WHERE instrument_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
                     ORDER BY timestamp ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![instrument_id, to_millis(start), to_millis(end)],
                |row| {
                    Ok(Candle {
                        timestamp: datetime_column(row.get(0)?)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_err)?;

        let mut candles = Vec::new();
        for row in rows {
            candles.push(row.map_err(query_err)?);
        }

        debug!(instrument_id, count = candles.len(), "fetched candles");
        CandleSeries::new(candles)
    }
}

impl StrategyPort for SqliteAdapter {
    fn resolve_strategy(&self, name: &str) -> Result<Strategy, CfTraderError> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, config FROM strategies WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(query_err)?;

        let Some((id, json)) = row else {
            return Err(CfTraderError::StrategyNotFound {
                name: name.to_string(),
            });
        };

        let config: StrategyConfig =
            serde_json::from_str(&json).map_err(|e| CfTraderError::InvalidParameter {
                name: "config".to_string(),
                reason: format!("strategy {name} has malformed JSON: {e}"),
            })?;

        Ok(Strategy {
            id,
            name: name.to_string(),
            config,
        })
    }
}

impl ResultPort for SqliteAdapter {
    fn persist_result(&self, result: &BacktestResult) -> Result<i64, CfTraderError> {
        let metrics = serde_json::to_string(&result.metrics).map_err(|e| CfTraderError::Storage {
            reason: format!("failed to encode metrics: {e}"),
        })?;

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        tx.execute(
            "INSERT INTO backtest_results
                (instrument_id, strategy_id, strategy_name, start_time, end_time,
                 total_trades, winning_trades, losing_trades, win_rate, total_pnl,
                 total_return, initial_balance, final_balance, metrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                result.instrument_id,
                result.strategy_id,
                result.strategy_name,
                to_millis(result.start_time),
                to_millis(result.end_time),
                result.total_trades as i64,
                result.winning_trades as i64,
                result.losing_trades as i64,
                result.win_rate,
                result.total_pnl,
                result.total_return,
                result.initial_balance,
                result.final_balance,
                metrics
            ],
        )
        .map_err(query_err)?;
        let id = tx.last_insert_rowid();

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO trades
                        (backtest_id, side, entry_price, entry_time, exit_price, exit_time,
                         size, pnl, exit_reason)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .map_err(query_err)?;
            for t in &result.trades {
                stmt.execute(params![
                    id,
                    t.side.as_str(),
                    t.entry_price,
                    to_millis(t.entry_time),
                    t.exit_price,
                    to_millis(t.exit_time),
                    t.size,
                    t.pnl,
                    t.exit_reason.as_str()
                ])
                .map_err(query_err)?;
            }
        }

        tx.commit().map_err(query_err)?;
        Ok(id)
    }
}
