//! HTTP request handlers for web adapter.

use axum::{
    Form, Json,
    extract::{FromRequestParts, Query, State},
    http::request::Parts,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::account::{Dashboard, Holdings, load_dashboard, load_holdings};
use crate::domain::backtest::{BacktestReport, backtest_symbol};
use crate::domain::error::TraderError;
use crate::domain::execution::{TradeOrder, TradeReceipt, execute_trade as execute_order};
use crate::domain::ohlcv::{LiveChart, load_live_chart};
use crate::domain::settings::validate_lookback;
use crate::domain::valuation::{PortfolioValuation, value_with_market};

use super::{AppState, WebError};

/// Authenticated account owner, taken from the configured identity header.
pub struct CurrentUser(pub String);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CurrentUser(v.to_string()))
            .ok_or_else(|| WebError::unauthorized("authentication required"))
    }
}

/// Run a blocking port call off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, WebError>
where
    F: FnOnce() -> Result<T, TraderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WebError::internal(format!("worker task failed: {e}")))?
        .map_err(WebError::from)
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BacktestQuery {
    pub symbol: Option<String>,
    pub lookback_days: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradeForm {
    pub symbol: Option<String>,
    pub action: Option<String>,
    pub quantity: Option<String>,
}

pub async fn list_symbols(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.settings.symbols.allowed().to_vec())
}

pub async fn stock_chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<LiveChart>, WebError> {
    let chart = blocking(move || {
        load_live_chart(
            state.market.as_ref(),
            &state.settings.symbols,
            query.symbol.as_deref(),
        )
    })
    .await?;
    Ok(Json(chart))
}

pub async fn backtest(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BacktestQuery>,
) -> Result<Json<BacktestReport>, WebError> {
    let mut config = state.settings.backtest.clone();
    if let Some(raw) = query.lookback_days.as_deref() {
        let days: i64 = raw
            .trim()
            .parse()
            .map_err(|_| WebError::bad_request(format!("invalid lookback_days: {raw}")))?;
        config.lookback_days = validate_lookback(days).map_err(WebError::bad_request)?;
    }

    let report = blocking(move || {
        backtest_symbol(
            state.market.as_ref(),
            &state.settings.symbols,
            query.symbol.as_deref(),
            &config,
        )
    })
    .await?;
    Ok(Json(report))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> Result<Json<Dashboard>, WebError> {
    let dashboard = blocking(move || {
        load_dashboard(
            state.ledger.as_ref(),
            &owner,
            state.settings.initial_balance,
            state.settings.symbols.allowed(),
        )
    })
    .await?;
    Ok(Json(dashboard))
}

pub async fn execute_trade(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Form(form): Form<TradeForm>,
) -> Result<Json<TradeReceipt>, WebError> {
    let order = TradeOrder::parse(
        form.symbol.as_deref(),
        form.action.as_deref(),
        form.quantity.as_deref(),
    )?;

    let outcome = blocking(move || {
        let account = state
            .ledger
            .open_account(&owner, state.settings.initial_balance)?;
        execute_order(
            state.ledger.as_ref(),
            state.market.as_ref(),
            &state.settings.symbols,
            &account,
            &order,
        )
    })
    .await?;
    Ok(Json(TradeReceipt::from(&outcome)))
}

pub async fn portfolio(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> Result<Json<Holdings>, WebError> {
    let holdings = blocking(move || {
        load_holdings(
            state.ledger.as_ref(),
            &owner,
            state.settings.initial_balance,
        )
    })
    .await?;
    Ok(Json(holdings))
}

pub async fn portfolio_value(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> Result<Json<PortfolioValuation>, WebError> {
    let valuation = blocking(move || {
        let Holdings { account, positions } = load_holdings(
            state.ledger.as_ref(),
            &owner,
            state.settings.initial_balance,
        )?;
        value_with_market(
            &account,
            &positions,
            state.market.as_ref(),
            &state.settings.symbols,
        )
    })
    .await?;
    Ok(Json(valuation))
}

pub async fn not_found() -> WebError {
    WebError::not_found("not found")
}
