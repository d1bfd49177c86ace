use serde::{Deserialize, Serialize};

use trader_core::error::{Result, TraderError};
use trader_core::types::TradeAction;

/// One line of the ledger file. Immutable once written; the file is
/// append-only NDJSON with no header or trailing structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Trading day (`YYYY-MM-DD`), caller-supplied rather than wall-clock so
    /// backtest/replay runs produce deterministic records.
    pub date: String,
    pub action: TradeAction,
    pub symbol: String,
    /// Shares transacted in this event.
    pub amount: u64,
    /// Execution price.
    pub price: f64,
    /// Agent's cumulative holding in `symbol` after this event. The latest
    /// entry per (account, symbol) in file order is authoritative.
    pub ai_position: u64,
    /// Brokerage-reported total (agent + manual) at the time of the event.
    /// Informational only; never used to derive `ai_position`.
    pub total_position: u64,
    pub account_id: String,
}

impl LedgerEntry {
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(TraderError::Validation("ledger entry: empty symbol".into()));
        }
        if self.amount == 0 {
            return Err(TraderError::Validation(format!(
                "ledger entry: amount must be > 0 for {}",
                self.symbol
            )));
        }
        if !(self.price > 0.0) {
            return Err(TraderError::Validation(format!(
                "ledger entry: price must be > 0, got {} for {}",
                self.price, self.symbol
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LedgerEntry {
        LedgerEntry {
            date: "2025-08-25".into(),
            action: TradeAction::Buy,
            symbol: "AAPL".into(),
            amount: 10,
            price: 150.0,
            ai_position: 10,
            total_position: 25,
            account_id: "default".into(),
        }
    }

    #[test]
    fn test_roundtrip_matches_file_format() {
        let line = serde_json::to_string(&entry()).unwrap();
        assert!(line.contains("\"action\":\"buy\""));
        let back: LedgerEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back.symbol, "AAPL");
        assert_eq!(back.ai_position, 10);
    }

    #[test]
    fn test_validate() {
        assert!(entry().validate().is_ok());

        let mut bad = entry();
        bad.amount = 0;
        assert!(bad.validate().is_err());

        let mut bad = entry();
        bad.price = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = entry();
        bad.symbol.clear();
        assert!(bad.validate().is_err());
    }
}
