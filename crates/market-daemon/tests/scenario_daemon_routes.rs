//! In-process scenario tests for market-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O required. The backing
//! engine is `Engine::bootstrap_in_memory`, which keeps persistence,
//! analytics, and risk in their disabled no-op states.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use market_daemon::{routes, state::AppState};
use market_engine::Engine;
use market_matching::TickerSeed;
use market_schemas::{OrderType, Side};
use tower::ServiceExt; // oneshot

fn seeds() -> Vec<TickerSeed> {
    vec![TickerSeed {
        symbol: "ACME".to_string(),
        name: "Acme Corp".to_string(),
        sector: "Industrials".to_string(),
        base_price: 50.0,
        volatility: 0.1,
    }]
}

async fn make_router() -> axum::Router {
    let engine = Engine::bootstrap_in_memory(seeds()).await;
    let state = Arc::new(AppState::new(engine));
    routes::build_router(state)
}

async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp.into_body().collect().await.expect("body collect failed").to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn json_body(value: serde_json::Value) -> axum::body::Body {
    axum::body::Body::from(serde_json::to_vec(&value).unwrap())
}

#[tokio::test]
async fn health_live_is_always_ok() {
    let router = make_router().await;
    let req = Request::builder().method("GET").uri("/health/live").body(axum::body::Body::empty()).unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "live");
}

#[tokio::test]
async fn health_ready_reports_not_ready_before_start_is_called() {
    let router = make_router().await;
    let req = Request::builder().method("GET").uri("/health/ready").body(axum::body::Body::empty()).unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(body)["status"], "not_ready");
}

#[tokio::test]
async fn markets_tickers_lists_the_seeded_symbol() {
    let router = make_router().await;
    let req = Request::builder().method("GET").uri("/api/v1/markets/tickers").body(axum::body::Body::empty()).unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json[0]["symbol"], "ACME");
}

#[tokio::test]
async fn markets_regimes_lists_the_default_regime_set() {
    let router = make_router().await;
    let req = Request::builder().method("GET").uri("/api/v1/markets/regimes").body(axum::body::Body::empty()).unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(parse_json(body).as_array().unwrap().len() > 0);
}

#[tokio::test]
async fn place_order_with_a_known_symbol_returns_200() {
    let router = make_router().await;
    let payload = serde_json::json!({
        "user_id": "alice",
        "symbol": "ACME",
        "side": "BUY",
        "order_type": "limit",
        "quantity": 10,
        "price": 50.0,
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(json_body(payload))
        .unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["order"]["user_id"], "alice");
}

#[tokio::test]
async fn place_order_with_an_unknown_symbol_returns_404() {
    let router = make_router().await;
    let payload = serde_json::json!({
        "user_id": "alice",
        "symbol": "NOPE",
        "side": "BUY",
        "order_type": "limit",
        "quantity": 10,
        "price": 50.0,
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(json_body(payload))
        .unwrap();

    let (status, _body) = call(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn place_order_missing_a_limit_price_returns_400() {
    let router = make_router().await;
    let payload = serde_json::json!({
        "user_id": "alice",
        "symbol": "ACME",
        "side": "BUY",
        "order_type": "limit",
        "quantity": 10,
    });
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(json_body(payload))
        .unwrap();

    let (status, _body) = call(router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn order_status_for_an_unknown_id_returns_404() {
    let router = make_router().await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/orders/does-not-exist")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, _body) = call(router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_status_after_placement_is_found() {
    let engine = Engine::bootstrap_in_memory(seeds()).await;
    let state = Arc::new(AppState::new(engine.clone()));

    let order_id = engine
        .place_order(market_schemas::OrderRequest {
            user_id: "alice".to_string(),
            symbol: "ACME".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: 10,
            price: Some(50.0),
        })
        .await
        .unwrap()
        .order
        .order_id;

    let req = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/orders/{order_id}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, _body) = call(routes::build_router(state), req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn portfolio_for_an_unknown_user_still_returns_a_snapshot() {
    let router = make_router().await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/portfolios/ghost")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["user_id"], "ghost");
}

#[tokio::test]
async fn recent_trades_is_empty_with_no_orders_placed() {
    let router = make_router().await;
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/trades")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = call(router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body).as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn recent_trades_respects_the_limit_query_parameter() {
    let engine = Engine::bootstrap_in_memory(seeds()).await;
    let state = Arc::new(AppState::new(engine.clone()));

    for (user, side) in [("bob", Side::Sell), ("alice", Side::Buy)] {
        engine
            .place_order(market_schemas::OrderRequest {
                user_id: user.to_string(),
                symbol: "ACME".to_string(),
                side,
                order_type: OrderType::Limit,
                quantity: 10,
                price: Some(50.0),
            })
            .await
            .unwrap();
    }

    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/trades?limit=1")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = call(routes::build_router(state), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body).as_array().unwrap().len(), 1);
}
