//! Axum router and all HTTP/WebSocket handlers for market-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so integration tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use market_engine::{EngineError, EngineEvent};
use market_schemas::{HealthStatus, OrderRequest};
use tracing::{info, warn};

use crate::api_types::{ErrorResponse, TradesQuery, DEFAULT_TRADES_LIMIT};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/api/v1/markets/tickers", get(markets_tickers))
        .route("/api/v1/markets/regimes", get(markets_regimes))
        .route("/api/v1/markets/news", get(markets_news))
        .route("/api/v1/orders", post(place_order))
        .route("/api/v1/orders/:order_id", get(order_status))
        .route("/api/v1/portfolios/:user_id", get(portfolio))
        .route("/api/v1/trades", get(recent_trades))
        .route("/ws/ticks", get(ws_ticks))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub(crate) async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthStatus { status: "live", details: None }))
}

pub(crate) async fn health_ready(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let durable_status = st.engine.durable_status().await;
    let ready = st.engine.is_ready();
    let mut details = std::collections::BTreeMap::new();
    details.insert("durable_store".to_string(), durable_status.to_string());
    let body = HealthStatus {
        status: if ready { "ready" } else { "not_ready" },
        details: Some(details),
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body))
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

pub(crate) async fn markets_tickers(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.engine.tickers_snapshot().await)
}

pub(crate) async fn markets_regimes(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.engine.regimes().await)
}

pub(crate) async fn markets_news(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.engine.recent_news().await)
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub(crate) async fn place_order(
    State(st): State<Arc<AppState>>,
    Json(request): Json<OrderRequest>,
) -> Response {
    match st.engine.place_order(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub(crate) async fn order_status(
    State(st): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Response {
    match st.engine.order_status(&order_id).await {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("order {order_id} not found"))),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Portfolios
// ---------------------------------------------------------------------------

pub(crate) async fn portfolio(State(st): State<Arc<AppState>>, Path(user_id): Path<String>) -> Response {
    match st.engine.portfolio(&user_id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => engine_error_response(err),
    }
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

pub(crate) async fn recent_trades(
    State(st): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_TRADES_LIMIT);
    Json(st.engine.recent_trades(limit).await)
}

// ---------------------------------------------------------------------------
// WS /ws/ticks — snapshot, then stream
// ---------------------------------------------------------------------------

pub(crate) async fn ws_ticks(ws: WebSocketUpgrade, State(st): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_ticks_socket(socket, st))
}

async fn handle_ticks_socket(mut socket: WebSocket, st: Arc<AppState>) {
    let snapshot = EngineEvent::Snapshot {
        data: st.engine.tickers_snapshot().await,
    };
    if send_event(&mut socket, &snapshot).await.is_err() {
        return;
    }

    let mut subscription = st.engine.register();
    loop {
        tokio::select! {
            event = subscription.receiver.recv() => {
                match event {
                    Some(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "ws/ticks read error");
                        break;
                    }
                }
            }
        }
    }
    info!("ws/ticks subscriber disconnected");
}

async fn send_event(socket: &mut WebSocket, event: &EngineEvent) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(event).expect("EngineEvent always serializes");
    socket.send(Message::Text(payload)).await
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn engine_error_response(err: EngineError) -> Response {
    match &err {
        EngineError::UnknownSymbol(symbol) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("unknown symbol {symbol}"))),
        )
            .into_response(),
        EngineError::MissingLimitPrice => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(err.to_string()))).into_response()
        }
        EngineError::OrderNotFound(_) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new(err.to_string()))).into_response()
        }
        EngineError::Risk(_) if err.is_risk_rejection() => {
            (StatusCode::CONFLICT, Json(ErrorResponse::new(err.to_string()))).into_response()
        }
        EngineError::Risk(_) => {
            warn!(error = %err, "risk gateway unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(err.to_string())),
            )
                .into_response()
        }
        EngineError::Infrastructure(source) => {
            warn!(error = %source, "infrastructure error serving request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("infrastructure error, try again later")),
            )
                .into_response()
        }
    }
}
