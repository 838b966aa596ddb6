//! End-to-end tests over the domain engines with mock market data and the
//! SQLite ledger.

mod common;

use common::*;
use papertrader::adapters::file_config_adapter::FileConfigAdapter;
use papertrader::adapters::sqlite_adapter::SqliteAdapter;
use papertrader::domain::account::{load_dashboard, load_holdings, DEFAULT_INITIAL_BALANCE};
use papertrader::domain::backtest::{backtest_symbol, BacktestConfig, TradeSide};
use papertrader::domain::error::TraderError;
use papertrader::domain::execution::{execute_trade, TradeOrder, TradeReceipt};
use papertrader::domain::ohlcv::load_live_chart;
use papertrader::domain::transaction::TradeAction;
use papertrader::domain::valuation::value_with_market;
use papertrader::ports::ledger_port::LedgerPort;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;

mod backtest_pipeline {
    use super::*;

    #[test]
    fn step_up_series_buys_once_and_holds() {
        let start = date(2021, 1, 1);
        let market =
            MockMarketData::new().with_daily("TCS.NS", daily_bars(start, &step_up_closes()));

        let report =
            backtest_symbol(&market, &symbols(), Some("TCS"), &BacktestConfig::default()).unwrap();

        assert_eq!(report.symbol, "TCS");
        assert_eq!(report.trades.len(), 1);
        let buy = &report.trades[0];
        assert_eq!(buy.side, TradeSide::Buy);
        assert_eq!(buy.price, 20.0);
        assert_eq!(buy.date, date(2021, 2, 20));
        assert_eq!(report.summary.total_trades, 0);
        assert_eq!(report.summary.net_profit, 0.0);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 100.0 + 15.0 * ((i as f64) / 9.0).sin() + (i as f64) * 0.05)
            .collect();
        let market =
            MockMarketData::new().with_daily("INFY.NS", daily_bars(date(2020, 1, 1), &closes));
        let config = BacktestConfig::default();

        let first = backtest_symbol(&market, &symbols(), Some("INFY"), &config).unwrap();
        let second = backtest_symbol(&market, &symbols(), Some("INFY"), &config).unwrap();
        assert_eq!(first, second);
        assert!(!first.trades.is_empty());
    }

    #[test]
    fn report_serializes_original_keys() {
        let market = MockMarketData::new()
            .with_daily("TCS.NS", daily_bars(date(2021, 1, 1), &step_up_closes()));
        let report =
            backtest_symbol(&market, &symbols(), Some("TCS"), &BacktestConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["symbol"], "TCS");
        assert_eq!(json["summary"]["total_trades"], 0);
        assert_eq!(json["trades"][0]["Type"], "Buy");
        assert_eq!(json["trades"][0]["Price"], 20.0);
        assert_eq!(json["trades"][0]["Time"], "2021-02-20");
        assert!(json["trades"][0].get("Profit").is_none());
    }

    #[test]
    fn unknown_symbol_rejected_before_fetch() {
        let market = MockMarketData::new().with_error("GOOG.NS", "should not be called");
        let result = backtest_symbol(
            &market,
            &symbols(),
            Some("GOOG"),
            &BacktestConfig::default(),
        );
        assert!(matches!(result, Err(TraderError::InvalidParameters { .. })));
    }

    #[test]
    fn empty_series_is_no_data() {
        let market = MockMarketData::new();
        let result =
            backtest_symbol(&market, &symbols(), Some("SBIN"), &BacktestConfig::default());
        match result {
            Err(TraderError::NoData { symbol }) => assert_eq!(symbol, "SBIN"),
            other => panic!("expected NoData, got {other:?}"),
        }
    }

    #[test]
    fn provider_failure_propagates() {
        let market = MockMarketData::new().with_error("SBIN.NS", "connection reset");
        let result =
            backtest_symbol(&market, &symbols(), Some("SBIN"), &BacktestConfig::default());
        assert!(matches!(result, Err(TraderError::Provider { .. })));
    }
}

mod live_chart {
    use super::*;

    #[test]
    fn chart_uses_intraday_series() {
        let market = MockMarketData::new()
            .with_intraday("WIPRO.NS", intraday_bars(date(2024, 3, 15), &[450.0, 451.5, 449.0]));
        let chart = load_live_chart(&market, &symbols(), Some("WIPRO")).unwrap();

        assert_eq!(chart.symbol, "WIPRO");
        assert_eq!(chart.data.len(), 3);
        assert_eq!(chart.data[0].datetime, "2024-03-15 09:15:00");
        assert_eq!(chart.data[2].datetime, "2024-03-15 09:45:00");
        assert_eq!(chart.data[1].close, 451.5);
    }

    #[test]
    fn missing_symbol_is_rejected() {
        let market = MockMarketData::new();
        assert!(matches!(
            load_live_chart(&market, &symbols(), None),
            Err(TraderError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn empty_intraday_is_no_data() {
        let market = MockMarketData::new();
        assert!(matches!(
            load_live_chart(&market, &symbols(), Some("WIPRO")),
            Err(TraderError::NoData { .. })
        ));
    }
}

mod paper_trading {
    use super::*;

    fn buy(symbol: &str, quantity: i64) -> TradeOrder {
        TradeOrder::new(symbol, TradeAction::Buy, quantity)
    }

    fn sell(symbol: &str, quantity: i64) -> TradeOrder {
        TradeOrder::new(symbol, TradeAction::Sell, quantity)
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("TCS.NS", dec!(100.00));
        let account = ledger.open_account("alice", dec!(100000.00)).unwrap();

        let bought = execute_trade(&ledger, &market, &symbols(), &account, &buy("TCS", 10)).unwrap();
        assert_eq!(bought.new_balance, dec!(99000.00));
        let position = ledger.position(account.id, "TCS").unwrap().unwrap();
        assert_eq!(position.quantity, 10);
        assert_eq!(position.average_cost, dec!(100.00));

        market.set_quote("TCS.NS", dec!(120.00));
        let sold =
            execute_trade(&ledger, &market, &symbols(), &account, &sell("TCS", 10)).unwrap();
        assert_eq!(sold.new_balance, dec!(100200.00));
        assert_eq!(sold.transaction.total_amount, dec!(1200.00));
        assert!(ledger.position(account.id, "TCS").unwrap().is_none());

        let history = ledger.recent_transactions(account.id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, TradeAction::Sell);
        assert_eq!(history[1].action, TradeAction::Buy);
        assert_eq!(history[1].total_amount, dec!(1000.00));

        let reloaded = ledger.open_account("alice", dec!(1.00)).unwrap();
        assert_eq!(reloaded.cash_balance, dec!(100200.00));
    }

    #[test]
    fn insufficient_funds_leaves_ledger_unchanged() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("MARUTI.NS", dec!(12000.00));
        let account = ledger.open_account("bob", dec!(10000.00)).unwrap();

        let result = execute_trade(&ledger, &market, &symbols(), &account, &buy("MARUTI", 1));
        match result {
            Err(TraderError::InsufficientFunds {
                required,
                available,
            }) => {
                assert_eq!(required, dec!(12000.00));
                assert_eq!(available, dec!(10000.00));
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }

        let after = ledger.open_account("bob", dec!(10000.00)).unwrap();
        assert_eq!(after.cash_balance, dec!(10000.00));
        assert_eq!(after.version, account.version);
        assert!(ledger.positions(account.id).unwrap().is_empty());
        assert!(ledger.recent_transactions(account.id, 10).unwrap().is_empty());
    }

    #[test]
    fn oversell_rejected_and_position_kept() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("LT.NS", dec!(3000.00));
        let account = ledger.open_account("carol", dec!(100000.00)).unwrap();

        execute_trade(&ledger, &market, &symbols(), &account, &buy("LT", 3)).unwrap();
        let result = execute_trade(&ledger, &market, &symbols(), &account, &sell("LT", 4));
        assert!(matches!(
            result,
            Err(TraderError::InsufficientShares {
                requested: 4,
                held: 3,
                ..
            })
        ));
        assert_eq!(ledger.position(account.id, "LT").unwrap().unwrap().quantity, 3);
    }

    #[test]
    fn selling_unheld_symbol_is_no_position() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("SBIN.NS", dec!(600.00));
        let account = ledger.open_account("dave", dec!(100000.00)).unwrap();

        let result = execute_trade(&ledger, &market, &symbols(), &account, &sell("SBIN", 1));
        assert!(matches!(result, Err(TraderError::NoPosition { .. })));
    }

    #[test]
    fn disallowed_symbol_skips_quote() {
        let ledger = memory_ledger();
        let market = MockMarketData::new();
        let account = ledger.open_account("erin", dec!(100000.00)).unwrap();

        let result = execute_trade(&ledger, &market, &symbols(), &account, &buy("AAPL", 1));
        assert!(matches!(result, Err(TraderError::InvalidParameters { .. })));
        assert_eq!(market.quote_calls(), 0);
    }

    #[test]
    fn quote_failure_writes_nothing() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_error("TITAN.NS", "timed out");
        let account = ledger.open_account("frank", dec!(100000.00)).unwrap();

        let result = execute_trade(&ledger, &market, &symbols(), &account, &buy("TITAN", 1));
        assert!(matches!(result, Err(TraderError::Provider { .. })));
        assert!(ledger.recent_transactions(account.id, 10).unwrap().is_empty());
    }

    #[test]
    fn averaged_buys_then_partial_sell() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("INFY.NS", dec!(1500.00));
        let account = ledger.open_account("grace", dec!(100000.00)).unwrap();

        execute_trade(&ledger, &market, &symbols(), &account, &buy("INFY", 10)).unwrap();
        market.set_quote("INFY.NS", dec!(1600.00));
        execute_trade(&ledger, &market, &symbols(), &account, &buy("INFY", 30)).unwrap();

        let position = ledger.position(account.id, "INFY").unwrap().unwrap();
        assert_eq!(position.quantity, 40);
        assert_eq!(position.average_cost, dec!(1575.00));

        market.set_quote("INFY.NS", dec!(1400.00));
        let outcome =
            execute_trade(&ledger, &market, &symbols(), &account, &sell("INFY", 15)).unwrap();
        assert_eq!(outcome.new_balance, dec!(100000.00) - dec!(15000.00) - dec!(48000.00) + dec!(21000.00));

        let position = ledger.position(account.id, "INFY").unwrap().unwrap();
        assert_eq!(position.quantity, 25);
        assert_eq!(position.average_cost, dec!(1575.00));
    }

    #[test]
    fn receipt_json_shape() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("BSE.NS", dec!(250.50));
        let account = ledger.open_account("heidi", dec!(1000.00)).unwrap();

        let outcome = execute_trade(&ledger, &market, &symbols(), &account, &buy("BSE", 2)).unwrap();
        let json = serde_json::to_value(TradeReceipt::from(&outcome)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "BUY order executed successfully");
        assert_eq!(json["new_balance"], 499.0);
    }
}

mod portfolio_views {
    use super::*;

    #[test]
    fn valuation_marks_positions_to_market() {
        let ledger = memory_ledger();
        let market = MockMarketData::new()
            .with_quote("TCS.NS", dec!(100.00))
            .with_quote("WIPRO.NS", dec!(400.00));
        let account = ledger.open_account("ivan", dec!(100000.00)).unwrap();

        execute_trade(
            &ledger,
            &market,
            &symbols(),
            &account,
            &TradeOrder::new("TCS", TradeAction::Buy, 10),
        )
        .unwrap();
        execute_trade(
            &ledger,
            &market,
            &symbols(),
            &account,
            &TradeOrder::new("WIPRO", TradeAction::Buy, 5),
        )
        .unwrap();

        market.set_quote("TCS.NS", dec!(110.00));
        market.set_quote("WIPRO.NS", dec!(380.00));

        let holdings = load_holdings(&ledger, "ivan", DEFAULT_INITIAL_BALANCE).unwrap();
        assert_eq!(holdings.account.cash_balance, dec!(97000.00));
        let valuation =
            value_with_market(&holdings.account, &holdings.positions, &market, &symbols()).unwrap();

        assert_eq!(valuation.cash_balance, dec!(97000.00));
        assert_eq!(valuation.total_value, dec!(97000.00) + dec!(1100.00) + dec!(1900.00));
        let tcs = valuation
            .positions
            .iter()
            .find(|p| p.symbol == "TCS")
            .unwrap();
        assert_eq!(tcs.unrealized_pnl, dec!(100.00));
        let wipro = valuation
            .positions
            .iter()
            .find(|p| p.symbol == "WIPRO")
            .unwrap();
        assert_eq!(wipro.unrealized_pnl, dec!(-100.00));
    }

    #[test]
    fn dashboard_creates_account_lazily() {
        let ledger = memory_ledger();
        let allowed = symbols().allowed().to_vec();

        let dashboard =
            load_dashboard(&ledger, "judy", DEFAULT_INITIAL_BALANCE, &allowed).unwrap();
        assert_eq!(dashboard.account.owner, "judy");
        assert_eq!(dashboard.account.cash_balance, dec!(100000.00));
        assert!(dashboard.positions.is_empty());
        assert!(dashboard.transactions.is_empty());
        assert_eq!(dashboard.allowed_symbols.len(), 15);
    }

    #[test]
    fn dashboard_keeps_ten_most_recent_transactions() {
        let ledger = memory_ledger();
        let market = MockMarketData::new().with_quote("SBIN.NS", dec!(10.00));
        let account = ledger.open_account("ken", dec!(100000.00)).unwrap();

        for quantity in 1..=12 {
            execute_trade(
                &ledger,
                &market,
                &symbols(),
                &account,
                &TradeOrder::new("SBIN", TradeAction::Buy, quantity),
            )
            .unwrap();
        }

        let dashboard =
            load_dashboard(&ledger, "ken", DEFAULT_INITIAL_BALANCE, &[]).unwrap();
        assert_eq!(dashboard.transactions.len(), 10);
        assert_eq!(dashboard.transactions[0].quantity, 12);
        assert_eq!(dashboard.transactions[9].quantity, 3);
        assert_eq!(dashboard.positions[0].quantity, 78);
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn concurrent_buys_never_overspend() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = format!(
            "[sqlite]\npath = {}\npool_size = 4\nbusy_timeout_ms = 10000\n",
            dir.path().join("ledger.db").display()
        );
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let ledger = SqliteAdapter::from_config(&config).unwrap();
        ledger.initialize_schema().unwrap();
        let ledger = Arc::new(ledger);

        let market = Arc::new(MockMarketData::new().with_quote("TCS.NS", dec!(1000.00)));
        let account = ledger.open_account("mallory", dec!(5000.00)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let market = Arc::clone(&market);
                let account = account.clone();
                thread::spawn(move || {
                    execute_trade(
                        ledger.as_ref(),
                        market.as_ref(),
                        &symbols(),
                        &account,
                        &TradeOrder::new("TCS", TradeAction::Buy, 1),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let filled = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(TraderError::InsufficientFunds { .. })))
            .count();

        assert_eq!(filled, 5);
        assert_eq!(rejected, 3);

        let after = ledger.open_account("mallory", dec!(5000.00)).unwrap();
        assert_eq!(after.cash_balance, dec!(0.00));
        let position = ledger.position(account.id, "TCS").unwrap().unwrap();
        assert_eq!(position.quantity, 5);
        assert_eq!(ledger.recent_transactions(account.id, 100).unwrap().len(), 5);
    }

    #[test]
    fn concurrent_sells_never_oversell() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = format!(
            "[sqlite]\npath = {}\npool_size = 4\nbusy_timeout_ms = 10000\n",
            dir.path().join("ledger.db").display()
        );
        let config = FileConfigAdapter::from_string(&ini).unwrap();
        let ledger = SqliteAdapter::from_config(&config).unwrap();
        ledger.initialize_schema().unwrap();
        let ledger = Arc::new(ledger);

        let market = Arc::new(MockMarketData::new().with_quote("INFY.NS", dec!(100.00)));
        let account = ledger.open_account("oscar", dec!(1000.00)).unwrap();
        execute_trade(
            ledger.as_ref(),
            market.as_ref(),
            &symbols(),
            &account,
            &TradeOrder::new("INFY", TradeAction::Buy, 4),
        )
        .unwrap();

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let market = Arc::clone(&market);
                let account = account.clone();
                thread::spawn(move || {
                    execute_trade(
                        ledger.as_ref(),
                        market.as_ref(),
                        &symbols(),
                        &account,
                        &TradeOrder::new("INFY", TradeAction::Sell, 1),
                    )
                })
            })
            .collect();

        let filled = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(filled, 4);

        let after = ledger.open_account("oscar", dec!(1000.00)).unwrap();
        assert_eq!(after.cash_balance, dec!(1000.00));
        assert!(ledger.position(account.id, "INFY").unwrap().is_none());
    }
}
