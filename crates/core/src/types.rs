use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Market {
    SH,
    SZ,
    /// US equities (NASDAQ, NYSE, AMEX)
    US,
    /// Hong Kong (HKEX)
    HK,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::SH => write!(f, "SH"),
            Market::SZ => write!(f, "SZ"),
            Market::US => write!(f, "US"),
            Market::HK => write!(f, "HK"),
        }
    }
}

impl Market {
    /// Detect market from symbol string.
    /// - Ends with ".SH"/".SZ" → domestic A-share venue
    /// - Ends with ".HK" → HK
    /// - Everything else → US (AAPL, GOOGL, BRK.B)
    pub fn from_symbol(symbol: &str) -> Self {
        let upper = symbol.to_uppercase();
        if upper.ends_with(".SH") {
            return Market::SH;
        }
        if upper.ends_with(".SZ") {
            return Market::SZ;
        }
        if upper.ends_with(".HK") {
            return Market::HK;
        }
        Market::US
    }

    /// Minimum tradable share multiple for this venue.
    /// A-shares trade in board lots of 100; US and HK are handled per-share
    /// here (HK per-stock lot sizes come from the broker, not the venue).
    pub fn lot_size(&self) -> u64 {
        match self {
            Market::SH | Market::SZ => 100,
            Market::US | Market::HK => 1,
        }
    }

    /// Return market region string: "CN", "US", "HK"
    pub fn region(&self) -> &'static str {
        match self {
            Market::SH | Market::SZ => "CN",
            Market::US => "US",
            Market::HK => "HK",
        }
    }
}

/// Buy/sell direction of a trade, serialized lowercase to match the
/// ledger file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_detection() {
        assert_eq!(Market::from_symbol("600519.SH"), Market::SH);
        assert_eq!(Market::from_symbol("000001.SZ"), Market::SZ);
        assert_eq!(Market::from_symbol("00700.HK"), Market::HK);
        assert_eq!(Market::from_symbol("AAPL"), Market::US);
        assert_eq!(Market::from_symbol("BRK.B"), Market::US);
    }

    #[test]
    fn test_lot_size() {
        assert_eq!(Market::SH.lot_size(), 100);
        assert_eq!(Market::SZ.lot_size(), 100);
        assert_eq!(Market::US.lot_size(), 1);
    }

    #[test]
    fn test_action_serde_lowercase() {
        assert_eq!(serde_json::to_string(&TradeAction::Buy).unwrap(), "\"buy\"");
        let a: TradeAction = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(a, TradeAction::Sell);
    }
}
