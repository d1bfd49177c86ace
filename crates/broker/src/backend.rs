use std::collections::HashMap;

use async_trait::async_trait;

use trader_core::error::Result;
use trader_core::models::{AccountSummary, OrderRequest};

/// Backend-specific primitives a brokerage must supply. Everything else —
/// validation, the sell-guard, price resolution, ledger bookkeeping — lives
/// in [`BrokerAdapter`](crate::adapter::BrokerAdapter) and is shared.
#[async_trait]
pub trait BrokerBackend: Send + Sync {
    /// Stable identifier scoping this backend's ledger file ("sim", "qmt", "futu").
    fn broker_type(&self) -> &'static str;

    /// Perform the real connection handshake. Called at most once per
    /// adapter lifetime on success; safe to call again after a failure.
    async fn establish(&self) -> Result<()>;

    /// Submit an order at the already-resolved execution price. Returns the
    /// backend's order identifier. Any backend rejection must come back as
    /// `Err` with the backend's message preserved.
    async fn submit(&self, order: &OrderRequest, price: f64) -> Result<String>;

    /// Brokerage-reported total holdings (agent + manual) per symbol.
    async fn total_positions(&self) -> Result<HashMap<String, u64>>;

    /// Cash and total-asset numbers for the account.
    async fn account_summary(&self) -> Result<AccountSummary>;

    /// Current price for a symbol from this backend's quote source.
    async fn quote(&self, symbol: &str) -> Result<f64>;

    /// Minimum tradable share multiple for this symbol on this venue.
    fn lot_size(&self, _symbol: &str) -> u64 {
        1
    }
}
