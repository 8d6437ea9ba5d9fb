//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, parse_candles};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_result_adapter::{JsonResultAdapter, write_result_json};
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::backtest::{BacktestOptions, BacktestRequest, BacktestResult, Backtester};
use crate::domain::candle::Candle;
use crate::domain::config_validation::{parse_datetime, validate_app_config, validate_strategy_config};
use crate::domain::error::CfTraderError;
use crate::domain::simulator::CancelToken;
use crate::domain::strategy::StrategyConfig;
use crate::ports::candle_port::CandlePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::result_port::ResultPort;
use crate::ports::strategy_port::StrategyPort;

#[derive(Parser, Debug)]
#[command(name = "cftrader", about = "Capital Flow strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest for one or more instruments
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: String,
        #[arg(short = 'i', long = "instrument", required = true, num_args = 1..)]
        instruments: Vec<i64>,
        /// YYYY-MM-DD or "YYYY-MM-DD HH:MM:SS"
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Write the result(s) as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Record the per-bar debug trace
        #[arg(long)]
        debug: bool,
    },
    /// Import candles from a CSV file
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short = 'i', long = "instrument")]
        instrument: i64,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Store a strategy from a JSON parameter file (sqlite backend)
    AddStrategy {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Validate the configuration and optionally one strategy
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        strategy: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            strategy,
            instruments,
            start,
            end,
            output,
            debug,
        } => run_backtest(
            &config,
            &strategy,
            &instruments,
            &start,
            &end,
            output.as_deref(),
            debug,
        ),
        Command::Import {
            config,
            instrument,
            file,
        } => run_import(&config, instrument, &file),
        Command::AddStrategy { config, name, file } => run_add_strategy(&config, &name, &file),
        Command::Validate { config, strategy } => run_validate(&config, strategy.as_deref()),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, CfTraderError> {
    FileConfigAdapter::from_file(path).map_err(|e| CfTraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Storage selected by `[storage] backend`.
pub enum Storage<'a> {
    Files {
        strategies: &'a FileConfigAdapter,
        candles: CsvAdapter,
        results: JsonResultAdapter,
    },
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteAdapter),
}

impl<'a> Storage<'a> {
    pub fn open(config: &'a FileConfigAdapter) -> Result<Self, CfTraderError> {
        let backend = config
            .get_string("storage", "backend")
            .unwrap_or_else(|| "sqlite".to_string());
        match backend.as_str() {
            "files" => {
                let candles_dir = config.get_string("files", "candles_dir").ok_or_else(|| {
                    CfTraderError::ConfigMissing {
                        section: "files".into(),
                        key: "candles_dir".into(),
                    }
                })?;
                let results_dir = config
                    .get_string("files", "results_dir")
                    .unwrap_or_else(|| "results".to_string());
                Ok(Storage::Files {
                    strategies: config,
                    candles: CsvAdapter::new(PathBuf::from(candles_dir)),
                    results: JsonResultAdapter::new(PathBuf::from(results_dir))?,
                })
            }
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let adapter = SqliteAdapter::from_config(config)?;
                adapter.initialize_schema()?;
                Ok(Storage::Sqlite(adapter))
            }
            other => Err(CfTraderError::ConfigInvalid {
                section: "storage".into(),
                key: "backend".into(),
                reason: format!("backend '{other}' is not available in this build"),
            }),
        }
    }

    pub fn candles(&self) -> &dyn CandlePort {
        match self {
            Storage::Files { candles, .. } => candles,
            #[cfg(feature = "sqlite")]
            Storage::Sqlite(db) => db,
        }
    }

    pub fn strategies(&self) -> &dyn StrategyPort {
        match self {
            Storage::Files { strategies, .. } => *strategies,
            #[cfg(feature = "sqlite")]
            Storage::Sqlite(db) => db,
        }
    }

    pub fn results(&self) -> &dyn ResultPort {
        match self {
            Storage::Files { results, .. } => results,
            #[cfg(feature = "sqlite")]
            Storage::Sqlite(db) => db,
        }
    }

    fn import(&self, instrument_id: i64, candles: &[Candle]) -> Result<usize, CfTraderError> {
        match self {
            Storage::Files { candles: csv, .. } => csv.import(instrument_id, candles),
            #[cfg(feature = "sqlite")]
            Storage::Sqlite(db) => db.insert_candles(instrument_id, candles),
        }
    }
}

fn run_backtest(
    config_path: &Path,
    strategy_name: &str,
    instruments: &[i64],
    start: &str,
    end: &str,
    output_path: Option<&Path>,
    debug: bool,
) -> Result<ExitCode, CfTraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_app_config(&config)?;

    let start = parse_datetime(start, "start")?;
    let end = parse_datetime(end, "end")?;

    let storage = Storage::open(&config)?;
    let mut options = BacktestOptions::from_config(&config);
    options.debug |= debug;

    let backtester = Backtester::new(storage.candles(), storage.strategies(), storage.results())
        .with_options(options);

    let requests: Vec<BacktestRequest> = instruments
        .iter()
        .map(|&instrument_id| BacktestRequest {
            instrument_id,
            strategy_name: strategy_name.to_string(),
            start,
            end,
        })
        .collect();

    eprintln!(
        "Running strategy {} on {} instrument(s) from {} to {}",
        strategy_name,
        requests.len(),
        start,
        end
    );

    let mut completed = Vec::new();
    let mut first_error: Option<CfTraderError> = None;
    for (request, outcome) in requests.iter().zip(backtester.run_many(&requests, &CancelToken::new())) {
        match outcome {
            Ok(result) => {
                print_summary(&result);
                completed.push(result);
            }
            Err(e) => {
                eprintln!("error: instrument {}: {e}", request.instrument_id);
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(path) = output_path {
        if !completed.is_empty() {
            write_output(path, &completed)?;
            eprintln!("\nResult written to: {}", path.display());
        }
    }

    Ok(match first_error {
        Some(e) => (&e).into(),
        None => ExitCode::SUCCESS,
    })
}

fn write_output(path: &Path, results: &[BacktestResult]) -> Result<(), CfTraderError> {
    if let [single] = results {
        return write_result_json(path, single);
    }
    let json = serde_json::to_string_pretty(results).map_err(|e| CfTraderError::Storage {
        reason: format!("failed to encode results: {e}"),
    })?;
    fs::write(path, json).map_err(|e| CfTraderError::Storage {
        reason: format!("failed to write {}: {}", path.display(), e),
    })
}

pub fn print_summary(result: &BacktestResult) {
    eprintln!(
        "\n=== Instrument {} / {} ===",
        result.instrument_id, result.strategy_name
    );
    if let Some(id) = result.id {
        eprintln!("Result Id:        {id}");
    }
    eprintln!("Total Trades:     {}", result.total_trades);
    eprintln!(
        "Won / Lost:       {} / {}",
        result.winning_trades, result.losing_trades
    );
    eprintln!("Win Rate:         {:.1}%", result.win_rate);
    eprintln!("Total P&L:        {:.2}", result.total_pnl);
    eprintln!("Total Return:     {:.2}%", result.total_return);
    eprintln!(
        "Balance:          {:.2} -> {:.2}",
        result.initial_balance, result.final_balance
    );
    for (name, value) in &result.metrics {
        eprintln!("{:<17} {:.4}", format!("{name}:"), value);
    }
}

fn run_import(config_path: &Path, instrument_id: i64, file: &Path) -> Result<ExitCode, CfTraderError> {
    let config = load_config(config_path)?;
    validate_app_config(&config)?;

    eprintln!("Reading candles from {}", file.display());
    let reader = fs::File::open(file)?;
    let candles = parse_candles(reader, &file.display().to_string())?;
    if candles.is_empty() {
        return Err(CfTraderError::NoData { instrument_id });
    }

    let storage = Storage::open(&config)?;
    let added = storage.import(instrument_id, &candles)?;
    eprintln!(
        "Imported {added} new candle(s) for instrument {instrument_id} ({} parsed)",
        candles.len()
    );
    Ok(ExitCode::SUCCESS)
}

/// Reads strategy parameters from JSON. Missing keys take their defaults.
pub fn read_strategy_file(path: &Path) -> Result<StrategyConfig, CfTraderError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| CfTraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn run_add_strategy(config_path: &Path, name: &str, file: &Path) -> Result<ExitCode, CfTraderError> {
    let config = load_config(config_path)?;
    validate_app_config(&config)?;

    let strategy = read_strategy_file(file)?;
    validate_strategy_config(&strategy)?;

    match Storage::open(&config)? {
        #[cfg(feature = "sqlite")]
        Storage::Sqlite(db) => {
            let id = db.upsert_strategy(name, &strategy)?;
            eprintln!("Stored strategy {name} with id {id}");
            Ok(ExitCode::SUCCESS)
        }
        Storage::Files { .. } => Err(CfTraderError::ConfigInvalid {
            section: "storage".into(),
            key: "backend".into(),
            reason: format!(
                "add-strategy needs the sqlite backend; define [strategy:{name}] in the config file instead"
            ),
        }),
    }
}

fn run_validate(config_path: &Path, strategy_name: Option<&str>) -> Result<ExitCode, CfTraderError> {
    eprintln!("Validating config: {}", config_path.display());
    let config = load_config(config_path)?;
    validate_app_config(&config)?;
    eprintln!("Config validated successfully");

    let names: Vec<String> = match strategy_name {
        Some(name) => vec![name.to_string()],
        None => config.strategy_names(),
    };
    if names.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let storage = Storage::open(&config)?;
    for name in names {
        let strategy = storage.strategies().resolve_strategy(&name)?;
        validate_strategy_config(&strategy.config)?;
        eprintln!(
            "Strategy {} (id {}): ok, needs at least {} candles",
            strategy.name,
            strategy.id,
            strategy.config.min_candles()
        );
    }
    Ok(ExitCode::SUCCESS)
}
