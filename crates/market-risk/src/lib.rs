//! Pre-trade credit gate and best-effort event publication to an external
//! risk middleware. This is the single choke-point through which every
//! order must pass before it can touch the book.

use std::time::Duration;

use market_schemas::{OrderRequest, OrderStatus, PortfolioResponse, TradeFill};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

const DEFAULT_CREDIT_ENDPOINT: &str = "internal/risk/credit";
const DEFAULT_EVENTS_ENDPOINT: &str = "internal/risk/events";

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("insufficient credit for order notional {0:.2}. Available: {1:.2}")]
    Rejected(f64, f64),
    #[error("risk service unavailable: {0}")]
    Unavailable(String),
}

pub struct RiskGateway {
    base_url: Option<String>,
    client: reqwest::Client,
    credit_endpoint: String,
    events_endpoint: String,
}

impl RiskGateway {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("static client configuration is always valid");
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            client,
            credit_endpoint: DEFAULT_CREDIT_ENDPOINT.trim_matches('/').to_string(),
            events_endpoint: DEFAULT_EVENTS_ENDPOINT.trim_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// No-op when no risk endpoint is configured, matching the original's
    /// `if not self._base_url: return`.
    pub async fn ensure_credit_limit(&self, order: &OrderRequest, notional: f64) -> Result<(), RiskError> {
        let Some(base) = &self.base_url else {
            return Ok(());
        };
        let url = format!("{base}/{}/{}", self.credit_endpoint, order.user_id);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", order.symbol.as_str()), ("notional", &notional.to_string())])
            .send()
            .await
            .map_err(|err| RiskError::Unavailable(err.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|err| RiskError::Unavailable(err.to_string()))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|err| RiskError::Unavailable(err.to_string()))?;
        let available = payload.get("available").and_then(Value::as_f64).unwrap_or(0.0);
        if available < notional {
            self.publish_event(
                "risk.limit_breach",
                json!({
                    "user_id": order.user_id,
                    "symbol": order.symbol,
                    "requested_notional": round2(notional),
                    "available_notional": round2(available),
                }),
            )
            .await;
            return Err(RiskError::Rejected(notional, available));
        }
        Ok(())
    }

    pub async fn publish_order(&self, status: &OrderStatus, notional: f64) {
        self.publish_event(
            "risk.order.accepted",
            json!({"order": status, "notional": round2(notional)}),
        )
        .await;
    }

    pub async fn publish_fills(&self, status: &OrderStatus, fills: &[TradeFill]) {
        self.publish_event("risk.order.filled", json!({"order": status, "fills": fills}))
            .await;
    }

    pub async fn publish_portfolio(&self, snapshot: &PortfolioResponse) {
        self.publish_event(
            "risk.portfolio.snapshot",
            serde_json::to_value(snapshot).unwrap_or(Value::Null),
        )
        .await;
    }

    /// Best-effort: transport failures never propagate to the caller.
    pub async fn publish_event(&self, event_type: &str, payload: Value) {
        let Some(base) = &self.base_url else {
            return;
        };
        let url = format!("{base}/{}", self.events_endpoint);
        let body = json!({"type": event_type, "payload": payload});
        if let Err(err) = self.client.post(&url).json(&body).send().await {
            warn!(error = %err, event_type, "risk event publish failed, dropping");
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn order() -> OrderRequest {
        OrderRequest {
            user_id: "alice".to_string(),
            symbol: "ACME".to_string(),
            side: market_schemas::Side::Buy,
            order_type: market_schemas::OrderType::Limit,
            quantity: 10,
            price: Some(10.0),
        }
    }

    #[tokio::test]
    async fn credit_check_is_a_noop_without_a_base_url() {
        let gateway = RiskGateway::new(None, Duration::from_secs(1));
        assert!(gateway.ensure_credit_limit(&order(), 100.0).await.is_ok());
    }

    #[tokio::test]
    async fn publish_without_base_url_is_a_noop() {
        let gateway = RiskGateway::new(None, Duration::from_secs(1));
        gateway.publish_event("risk.test", json!({})).await;
    }

    #[tokio::test]
    async fn credit_check_passes_when_notional_is_within_limit() {
        let server = MockServer::start();
        let credit_mock = server.mock(|when, then| {
            when.method(GET).path("/internal/risk/credit/alice");
            then.status(200).json_body(json!({"available": 500.0}));
        });
        let gateway = RiskGateway::new(Some(server.base_url()), Duration::from_secs(1));

        assert!(gateway.ensure_credit_limit(&order(), 100.0).await.is_ok());
        credit_mock.assert();
    }

    #[tokio::test]
    async fn credit_check_rejects_and_publishes_a_limit_breach_event_when_notional_exceeds_available() {
        let server = MockServer::start();
        let credit_mock = server.mock(|when, then| {
            when.method(GET).path("/internal/risk/credit/alice");
            then.status(200).json_body(json!({"available": 50.0}));
        });
        let breach_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/internal/risk/events")
                .json_body_partial(json!({"type": "risk.limit_breach"}).to_string());
            then.status(200);
        });
        let gateway = RiskGateway::new(Some(server.base_url()), Duration::from_secs(1));

        let err = gateway.ensure_credit_limit(&order(), 100.0).await.unwrap_err();
        assert!(matches!(err, RiskError::Rejected(notional, available) if notional == 100.0 && available == 50.0));
        credit_mock.assert();
        breach_mock.assert();
    }

    #[tokio::test]
    async fn credit_check_maps_transport_failures_to_unavailable() {
        // Port 0 never accepts a connection; this exercises the transport
        // error path without depending on network timing.
        let gateway = RiskGateway::new(Some("http://127.0.0.1:0".to_string()), Duration::from_millis(200));
        assert!(matches!(
            gateway.ensure_credit_limit(&order(), 100.0).await,
            Err(RiskError::Unavailable(_))
        ));
    }
}
