//! Futu international backend — talks to the local OpenD-style gateway.
//!
//! Same sidecar pattern as the QMT bridge: the vendor SDK lives behind a
//! small HTTP API on localhost. Symbols travel on the wire with the gateway's
//! market prefix (`US.AAPL`, `HK.00700`) and come back stripped, so the rest
//! of the system only ever sees plain tickers.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use trader_core::error::{Result, TraderError};
use trader_core::models::{AccountSummary, OrderRequest};
use trader_core::types::{OrderType, TradeAction};

use crate::backend::BrokerBackend;

// ── Gateway API types ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GatewayOrderRequest {
    code: String,
    price: f64,
    qty: u64,
    trd_side: String,
    order_type: String,
}

#[derive(Debug, Deserialize)]
struct GatewayOrderResponse {
    order_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayPosition {
    code: String,
    qty: f64,
}

#[derive(Debug, Deserialize)]
struct GatewayPositionsResponse {
    positions: Option<Vec<GatewayPosition>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayAccountResponse {
    cash: Option<f64>,
    total_assets: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayQuoteResponse {
    price: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayHealthResponse {
    status: String,
    connected: bool,
}

// ── Futu backend ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FutuConfig {
    pub host: String,
    pub port: u16,
    /// Gateway market context: "US" or "HK".
    pub market: String,
    pub account: String,
}

pub struct FutuBackend {
    config: FutuConfig,
    client: Client,
}

impl FutuBackend {
    pub fn new(config: FutuConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }

    fn gateway_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.port)
    }

    /// Add the gateway's market prefix unless the caller already did.
    fn normalize_symbol(&self, symbol: &str) -> String {
        let market = self.config.market.to_uppercase();
        if symbol.starts_with("US.") || symbol.starts_with("HK.") {
            return symbol.to_string();
        }
        format!("{}.{}", market, symbol)
    }

    /// Strip the market prefix from a wire symbol.
    fn plain_symbol(code: &str) -> String {
        code.strip_prefix("US.")
            .or_else(|| code.strip_prefix("HK."))
            .unwrap_or(code)
            .to_string()
    }
}

#[async_trait]
impl BrokerBackend for FutuBackend {
    fn broker_type(&self) -> &'static str {
        "futu"
    }

    async fn establish(&self) -> Result<()> {
        let url = format!("{}/health", self.gateway_url());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Futu gateway unreachable: {}", e)))?;
        let health: GatewayHealthResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad health response: {}", e)))?;
        if health.status != "ok" || !health.connected {
            return Err(TraderError::Broker(format!(
                "Futu gateway not connected (status={})",
                health.status
            )));
        }
        info!(market = %self.config.market, account = %self.config.account, "Futu gateway connected");
        Ok(())
    }

    async fn submit(&self, order: &OrderRequest, price: f64) -> Result<String> {
        let req = GatewayOrderRequest {
            code: self.normalize_symbol(&order.symbol),
            price,
            qty: order.amount,
            trd_side: match order.action {
                TradeAction::Buy => "BUY".into(),
                TradeAction::Sell => "SELL".into(),
            },
            order_type: match order.order_type {
                OrderType::Market => "MARKET".into(),
                OrderType::Limit => "NORMAL".into(),
            },
        };

        let url = format!("{}/order", self.gateway_url());
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Gateway request failed: {}", e)))?;

        let status = resp.status();
        let body: GatewayOrderResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad order response: {}", e)))?;

        match body.order_id {
            Some(id) if status.is_success() => {
                info!(symbol = %order.symbol, order_id = %id, "Futu order submitted");
                Ok(id)
            }
            _ => {
                let msg = body.error.unwrap_or_else(|| format!("HTTP {}", status));
                error!(symbol = %order.symbol, "Futu order failed: {}", msg);
                Err(TraderError::Broker(msg))
            }
        }
    }

    async fn total_positions(&self) -> Result<HashMap<String, u64>> {
        let url = format!("{}/positions", self.gateway_url());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Positions request failed: {}", e)))?;
        let body: GatewayPositionsResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad positions response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(TraderError::Broker(err));
        }
        Ok(body
            .positions
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.qty > 0.0)
            .map(|p| (Self::plain_symbol(&p.code), p.qty as u64))
            .collect())
    }

    async fn account_summary(&self) -> Result<AccountSummary> {
        let url = format!("{}/account", self.gateway_url());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Account request failed: {}", e)))?;
        let body: GatewayAccountResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad account response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(TraderError::Broker(err));
        }
        let cash = body.cash.unwrap_or(0.0);
        Ok(AccountSummary {
            cash,
            total_asset: body.total_assets.unwrap_or(cash),
        })
    }

    async fn quote(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/quote/{}", self.gateway_url(), self.normalize_symbol(symbol));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Quote request failed: {}", e)))?;
        let body: GatewayQuoteResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad quote response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(TraderError::Price(err));
        }
        match body.price {
            Some(p) if p > 0.0 => Ok(p),
            _ => Err(TraderError::Price(format!("no price for {}", symbol))),
        }
    }

    // Per-share venues; per-stock HK lot sizes are the gateway's concern.
}
