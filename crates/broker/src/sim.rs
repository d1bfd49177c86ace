//! Simulation backend: an in-process account ledger for dry runs and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use trader_core::error::{Result, TraderError};
use trader_core::models::{AccountSummary, OrderRequest};
use trader_core::types::{Market, TradeAction};

use crate::backend::BrokerBackend;

struct SimAccount {
    cash: f64,
    /// Total holdings per symbol, agent and (seeded) manual shares alike —
    /// this plays the role of the brokerage's combined view.
    positions: HashMap<String, u64>,
}

/// Fills every order instantly at the resolved price. Quotes come from a
/// settable table; an absent quote behaves like a dead market-data feed.
pub struct SimBackend {
    inner: Mutex<SimAccount>,
    quotes: Mutex<HashMap<String, f64>>,
}

impl SimBackend {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            inner: Mutex::new(SimAccount {
                cash: initial_cash,
                positions: HashMap::new(),
            }),
            quotes: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_quote(&self, symbol: &str, price: f64) {
        self.quotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), price);
    }

    /// Seed the simulated account with pre-existing holdings, standing in
    /// for shares a human operator bought outside the agent.
    pub fn seed_holding(&self, symbol: &str, amount: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner.positions.entry(symbol.to_string()).or_insert(0) += amount;
    }

    pub fn cash(&self) -> f64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).cash
    }
}

#[async_trait]
impl BrokerBackend for SimBackend {
    fn broker_type(&self) -> &'static str {
        "sim"
    }

    async fn establish(&self) -> Result<()> {
        // Nothing to connect to.
        Ok(())
    }

    async fn submit(&self, order: &OrderRequest, price: f64) -> Result<String> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| TraderError::Broker(e.to_string()))?;

        match order.action {
            TradeAction::Buy => {
                let required = price * order.amount as f64;
                if inner.cash < required {
                    return Err(TraderError::Broker(format!(
                        "Insufficient cash: need {:.2}, have {:.2}",
                        required, inner.cash
                    )));
                }
                inner.cash -= required;
                *inner.positions.entry(order.symbol.clone()).or_insert(0) += order.amount;
            }
            TradeAction::Sell => {
                let held = inner.positions.get(&order.symbol).copied().unwrap_or(0);
                if held < order.amount {
                    return Err(TraderError::Broker(format!(
                        "Insufficient shares: have {}, want to sell {}",
                        held, order.amount
                    )));
                }
                inner.cash += price * order.amount as f64;
                inner
                    .positions
                    .insert(order.symbol.clone(), held - order.amount);
            }
        }
        Ok(Uuid::new_v4().to_string())
    }

    async fn total_positions(&self) -> Result<HashMap<String, u64>> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| TraderError::Broker(e.to_string()))?;
        Ok(inner
            .positions
            .iter()
            .filter(|(_, &qty)| qty > 0)
            .map(|(s, &q)| (s.clone(), q))
            .collect())
    }

    async fn account_summary(&self) -> Result<AccountSummary> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| TraderError::Broker(e.to_string()))?;
        let quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        // Unquoted holdings contribute nothing to total_asset.
        let holdings_value: f64 = inner
            .positions
            .iter()
            .filter_map(|(sym, &qty)| quotes.get(sym).map(|p| p * qty as f64))
            .sum();
        Ok(AccountSummary {
            cash: inner.cash,
            total_asset: inner.cash + holdings_value,
        })
    }

    async fn quote(&self, symbol: &str) -> Result<f64> {
        self.quotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied()
            .ok_or_else(|| TraderError::Price(format!("no quote available for {}", symbol)))
    }

    fn lot_size(&self, symbol: &str) -> u64 {
        Market::from_symbol(symbol).lot_size()
    }
}
