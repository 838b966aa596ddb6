//! Web server adapter.
//!
//! JSON API over axum for the chart, backtest and paper-trading operations.
//! The caller's identity comes from a header set by a trusted front proxy.

mod error;
mod handlers;

pub use error::WebError;
pub use handlers::*;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::adapters::{SharedLedger, SharedMarketData};
use crate::domain::settings::Settings;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_USER_HEADER: &str = "X-Forwarded-User";

pub struct AppState {
    pub market: SharedMarketData,
    pub ledger: SharedLedger,
    pub settings: Settings,
    pub user_header: String,
}

impl AppState {
    pub fn new(market: SharedMarketData, ledger: SharedLedger, settings: Settings) -> Self {
        Self {
            market,
            ledger,
            settings,
            user_header: DEFAULT_USER_HEADER.to_string(),
        }
    }

    pub fn with_user_header(mut self, header: &str) -> Self {
        self.user_header = header.to_string();
        self
    }
}

/// `[web] user_header`, falling back to [`DEFAULT_USER_HEADER`].
pub fn user_header(config: &dyn ConfigPort) -> String {
    config
        .get_string("web", "user_header")
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_USER_HEADER.to_string())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/symbols", get(handlers::list_symbols))
        .route("/api/stocks", get(handlers::stock_chart))
        .route("/api/backtest", get(handlers::backtest))
        .route("/paper-trading", get(handlers::dashboard))
        .route("/paper-trading/execute-trade", post(handlers::execute_trade))
        .route("/portfolio", get(handlers::portfolio))
        .route("/api/portfolio/value", get(handlers::portfolio_value))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
