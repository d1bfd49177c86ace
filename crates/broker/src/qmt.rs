//! QMT domestic-terminal backend — talks to the local bridge sidecar.
//!
//! The bridge wraps the vendor trading SDK (miniQMT mode) and exposes a small
//! HTTP API on localhost. This backend never links the SDK itself; an
//! unreachable bridge surfaces as a clean connectivity error at `establish`
//! time instead of a deep-stack import failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use trader_core::error::{Result, TraderError};
use trader_core::models::{AccountSummary, OrderRequest};
use trader_core::types::{Market, OrderType, TradeAction};

use crate::backend::BrokerBackend;

// ── Bridge API types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct BridgeOrderRequest {
    stock_code: String,
    price: f64,
    amount: u64,
    side: String,
    price_type: String,
    strategy_name: String,
}

#[derive(Debug, Deserialize)]
struct BridgeOrderResponse {
    order_id: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgePosition {
    stock_code: String,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct BridgePositionsResponse {
    positions: Option<Vec<BridgePosition>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeAccountResponse {
    total_asset: Option<f64>,
    cash: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeQuoteResponse {
    price: Option<f64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BridgeHealthResponse {
    status: String,
    connected: bool,
}

// ── QMT backend ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QmtConfig {
    pub bridge_url: String,
    pub account: String,
    pub strategy_name: String,
}

pub struct QmtBackend {
    config: QmtConfig,
    client: Client,
}

impl QmtBackend {
    pub fn new(config: QmtConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { config, client }
    }
}

#[async_trait]
impl BrokerBackend for QmtBackend {
    fn broker_type(&self) -> &'static str {
        "qmt"
    }

    async fn establish(&self) -> Result<()> {
        let url = format!("{}/health", self.config.bridge_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("QMT bridge unreachable: {}", e)))?;
        let health: BridgeHealthResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad health response: {}", e)))?;
        if health.status != "ok" || !health.connected {
            return Err(TraderError::Broker(format!(
                "QMT bridge not connected (status={})",
                health.status
            )));
        }
        info!(account = %self.config.account, "QMT bridge connected");
        Ok(())
    }

    async fn submit(&self, order: &OrderRequest, price: f64) -> Result<String> {
        let req = BridgeOrderRequest {
            stock_code: order.symbol.clone(),
            price,
            amount: order.amount,
            side: match order.action {
                TradeAction::Buy => "buy".into(),
                TradeAction::Sell => "sell".into(),
            },
            price_type: match order.order_type {
                OrderType::Market => "market".into(),
                OrderType::Limit => "limit".into(),
            },
            strategy_name: self.config.strategy_name.clone(),
        };

        let url = format!("{}/order", self.config.bridge_url);
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Bridge request failed: {}", e)))?;

        let status = resp.status();
        let body: BridgeOrderResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad order response: {}", e)))?;

        match body.order_id {
            Some(id) if status.is_success() => {
                info!(symbol = %order.symbol, qmt_id = id, "QMT order submitted");
                Ok(id.to_string())
            }
            _ => {
                let msg = body.error.unwrap_or_else(|| format!("HTTP {}", status));
                error!(symbol = %order.symbol, "QMT order failed: {}", msg);
                Err(TraderError::Broker(msg))
            }
        }
    }

    async fn total_positions(&self) -> Result<HashMap<String, u64>> {
        let url = format!("{}/positions", self.config.bridge_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Positions request failed: {}", e)))?;
        let body: BridgePositionsResponse = resp
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
            .filter(|p| p.volume > 0.0)
            .map(|p| (p.stock_code, p.volume as u64))
            .collect())
    }

    async fn account_summary(&self) -> Result<AccountSummary> {
        let url = format!("{}/account", self.config.bridge_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Account request failed: {}", e)))?;
        let body: BridgeAccountResponse = resp
            .json()
            .await
            .map_err(|e| TraderError::Broker(format!("Bad account response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(TraderError::Broker(err));
        }
        let cash = body.cash.unwrap_or(0.0);
        Ok(AccountSummary {
            cash,
            total_asset: body.total_asset.unwrap_or(cash),
        })
    }

    async fn quote(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/quote/{}", self.config.bridge_url, symbol);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TraderError::Broker(format!("Quote request failed: {}", e)))?;
        let body: BridgeQuoteResponse = resp
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

    /// A-shares trade in board lots of 100.
    fn lot_size(&self, symbol: &str) -> u64 {
        Market::from_symbol(symbol).lot_size()
    }
}
