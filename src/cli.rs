//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::{open_ledger, open_market_data};
use crate::domain::account::{Dashboard, load_dashboard, load_holdings};
use crate::domain::backtest::{BacktestReport, backtest_symbol};
use crate::domain::error::TraderError;
use crate::domain::execution::{TradeOrder, TradeReceipt, execute_trade};
use crate::domain::ohlcv::{LiveChart, load_live_chart};
use crate::domain::settings::{Settings, validate_config, validate_lookback};
use crate::domain::valuation::{PortfolioValuation, value_with_market};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LOG_FILTER: &str = "papertrader=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "papertrader", about = "EMA crossover backtester and paper-trading ledger")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the EMA crossover strategy on one symbol
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
        #[arg(long)]
        lookback_days: Option<i64>,
    },
    /// Print today's intraday chart for a symbol
    Chart {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
    },
    /// Print the latest quote for a symbol
    Quote {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
    },
    /// Execute a paper trade at the live quote
    Trade {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        action: String,
        #[arg(short, long)]
        quantity: String,
    },
    /// Value a user's paper portfolio at live quotes
    Portfolio {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
    },
    /// Show a user's balance, positions and recent transactions
    Dashboard {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
    },
    /// List the tradable symbols
    Symbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: rust_decimal::Decimal,
}

/// Install the stderr subscriber. `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`].
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Backtest {
            config,
            symbol,
            lookback_days,
        } => with_config(&config, |c| backtest_report(c, &symbol, lookback_days)),
        Command::Chart { config, symbol } => with_config(&config, |c| live_chart(c, &symbol)),
        Command::Quote { config, symbol } => with_config(&config, |c| latest_quote(c, &symbol)),
        Command::Trade {
            config,
            user,
            symbol,
            action,
            quantity,
        } => with_config(&config, |c| trade(c, &user, &symbol, &action, &quantity)),
        Command::Portfolio { config, user } => {
            with_config(&config, |c| portfolio_value(c, &user))
        }
        Command::Dashboard { config, user } => with_config(&config, |c| dashboard(c, &user)),
        Command::Symbols { config } => with_config(&config, symbols),
        Command::Validate { config } => with_config(&config, validate),
        Command::Serve { config } => run_serve(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, TraderError> {
    FileConfigAdapter::from_file(path)
}

fn with_config<T, F>(path: &PathBuf, command: F) -> ExitCode
where
    T: Serialize,
    F: FnOnce(&dyn ConfigPort) -> Result<T, TraderError>,
{
    let result = load_config(path).and_then(|config| command(&config));
    finish(result)
}

/// Print a successful result as JSON, or the error with its exit code.
fn finish<T: Serialize>(result: Result<T, TraderError>) -> ExitCode {
    let outcome = result.and_then(|value| {
        serde_json::to_string_pretty(&value)
            .map_err(|e| TraderError::Io(std::io::Error::other(e)))
    });
    match outcome {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn backtest_report(
    config: &dyn ConfigPort,
    symbol: &str,
    lookback_days: Option<i64>,
) -> Result<BacktestReport, TraderError> {
    let settings = Settings::from_config(config)?;
    let mut backtest = settings.backtest.clone();
    if let Some(days) = lookback_days {
        backtest.lookback_days = validate_lookback(days).map_err(TraderError::invalid)?;
    }
    let market = open_market_data(config)?;
    backtest_symbol(market.as_ref(), &settings.symbols, Some(symbol), &backtest)
}

pub fn live_chart(config: &dyn ConfigPort, symbol: &str) -> Result<LiveChart, TraderError> {
    let settings = Settings::from_config(config)?;
    let market = open_market_data(config)?;
    load_live_chart(market.as_ref(), &settings.symbols, Some(symbol))
}

pub fn latest_quote(config: &dyn ConfigPort, symbol: &str) -> Result<Quote, TraderError> {
    let settings = Settings::from_config(config)?;
    let symbol = settings.symbols.validate(Some(symbol))?;
    let market = open_market_data(config)?;
    let price = market.fetch_latest_quote(&settings.symbols.ticker(symbol))?;
    Ok(Quote {
        symbol: symbol.to_string(),
        price,
    })
}

pub fn trade(
    config: &dyn ConfigPort,
    user: &str,
    symbol: &str,
    action: &str,
    quantity: &str,
) -> Result<TradeReceipt, TraderError> {
    let settings = Settings::from_config(config)?;
    let order = TradeOrder::parse(Some(symbol), Some(action), Some(quantity))?;
    let market = open_market_data(config)?;
    let ledger = open_ledger(config)?;
    let account = ledger.open_account(user, settings.initial_balance)?;
    let outcome = execute_trade(
        ledger.as_ref(),
        market.as_ref(),
        &settings.symbols,
        &account,
        &order,
    )?;
    Ok(TradeReceipt::from(&outcome))
}

pub fn portfolio_value(
    config: &dyn ConfigPort,
    user: &str,
) -> Result<PortfolioValuation, TraderError> {
    let settings = Settings::from_config(config)?;
    let ledger = open_ledger(config)?;
    let holdings = load_holdings(ledger.as_ref(), user, settings.initial_balance)?;
    let market = open_market_data(config)?;
    value_with_market(
        &holdings.account,
        &holdings.positions,
        market.as_ref(),
        &settings.symbols,
    )
}

pub fn dashboard(config: &dyn ConfigPort, user: &str) -> Result<Dashboard, TraderError> {
    let settings = Settings::from_config(config)?;
    let ledger = open_ledger(config)?;
    load_dashboard(
        ledger.as_ref(),
        user,
        settings.initial_balance,
        settings.symbols.allowed(),
    )
}

pub fn symbols(config: &dyn ConfigPort) -> Result<Vec<String>, TraderError> {
    let settings = Settings::from_config(config)?;
    Ok(settings.symbols.allowed().to_vec())
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub symbols: usize,
    pub fast_span: usize,
    pub slow_span: usize,
    pub lookback_days: u32,
}

pub fn validate(config: &dyn ConfigPort) -> Result<ValidationReport, TraderError> {
    validate_config(config)?;
    let settings = Settings::from_config(config)?;
    Ok(ValidationReport {
        valid: true,
        symbols: settings.symbols.allowed().len(),
        fast_span: settings.backtest.fast_span,
        slow_span: settings.backtest.slow_span,
        lookback_days: settings.backtest.lookback_days,
    })
}

fn run_serve(config_path: &PathBuf) -> ExitCode {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, DEFAULT_LISTEN, build_router, user_header};
        use std::net::SocketAddr;

        let setup = || -> Result<(SocketAddr, AppState), TraderError> {
            let config = load_config(config_path)?;
            let settings = Settings::from_config(&config)?;
            let listen = config
                .get_string("web", "listen")
                .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
            let addr: SocketAddr =
                listen
                    .trim()
                    .parse()
                    .map_err(|_| TraderError::ConfigInvalid {
                        section: "web".into(),
                        key: "listen".into(),
                        reason: format!("'{listen}' is not a socket address"),
                    })?;
            let state = AppState::new(open_market_data(&config)?, open_ledger(&config)?, settings)
                .with_user_header(&user_header(&config));
            Ok((addr, state))
        };

        let (addr, state) = match setup() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(&e);
            }
        };

        let router = build_router(state);
        let served = tokio::runtime::Runtime::new().and_then(|runtime| {
            runtime.block_on(async {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                tracing::info!(%addr, "web server listening");
                axum::serve(listener, router).await
            })
        });

        match served {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                let err = TraderError::Io(e);
                eprintln!("error: {err}");
                ExitCode::from(&err)
            }
        }
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        eprintln!("error: web feature is required for serve");
        ExitCode::from(1)
    }
}
