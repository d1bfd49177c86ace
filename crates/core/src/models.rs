use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::types::{OrderType, TradeAction};

// ── Orders ───────────────────────────────────────────────────

/// A trade request as handed to a broker backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub amount: u64,
    /// Caller-supplied price. Required for limit orders; optional for
    /// market orders (resolved from the backend's quote source).
    pub price: Option<f64>,
    pub order_type: OrderType,
    pub action: TradeAction,
}

// ── Trade results ────────────────────────────────────────────

/// Successful trade confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFill {
    pub order_id: String,
    pub message: String,
    pub symbol: String,
    pub amount: u64,
    pub price: f64,
    /// Agent-held quantity after this trade, per the position ledger.
    pub ai_position: u64,
    /// Brokerage-reported total (agent + manual) observed post-trade.
    pub total_position: u64,
}

/// Structured trade rejection. Sell-guard rejections carry the position
/// breakdown; plain validation rejections leave it empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRejection {
    pub error: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_position: Option<u64>,
}

impl TradeRejection {
    pub fn new(error: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            symbol: symbol.into(),
            amount: None,
            ai_position: None,
            total_position: None,
            manual_position: None,
        }
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Outcome of a buy/sell call: either a fill confirmation or a structured
/// rejection. Fatal faults (ledger I/O, lock acquisition) are `Err`, not a
/// `Rejected` variant.
#[derive(Debug, Clone)]
pub enum TradeOutcome {
    Filled(TradeFill),
    Rejected(TradeRejection),
}

impl TradeOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, TradeOutcome::Filled(_))
    }

    pub fn rejected(error: impl Into<String>, symbol: impl Into<String>) -> Self {
        TradeOutcome::Rejected(TradeRejection::new(error, symbol))
    }
}

// Wire shape: the inner struct's fields flattened alongside a `success` flag.
impl Serialize for TradeOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let (success, value) = match self {
            TradeOutcome::Filled(fill) => (true, serde_json::to_value(fill)),
            TradeOutcome::Rejected(rej) => (false, serde_json::to_value(rej)),
        };
        let value = value.map_err(serde::ser::Error::custom)?;
        let fields = value
            .as_object()
            .ok_or_else(|| serde::ser::Error::custom("trade outcome must serialize to an object"))?;
        let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
        map.serialize_entry("success", &success)?;
        for (k, v) in fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Positions ────────────────────────────────────────────────

/// Cash and total-asset numbers from the backend account query.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccountSummary {
    pub cash: f64,
    pub total_asset: f64,
}

/// Full position breakdown: brokerage totals, agent-held, and the inferred
/// manual remainder (total − ai, clamped positive, omitted at ≤ 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReport {
    pub total_positions: HashMap<String, u64>,
    pub ai_positions: HashMap<String, u64>,
    pub manual_positions: HashMap<String, u64>,
    pub cash: f64,
    pub total_asset: f64,
}

/// Single-symbol position breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolPosition {
    pub symbol: String,
    pub total_position: u64,
    pub ai_position: u64,
    pub manual_position: u64,
}

/// Result of a position query, scoped to one symbol or the full account.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PositionView {
    Full(PositionReport),
    Symbol(SymbolPosition),
}
